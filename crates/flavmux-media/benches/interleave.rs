//! Benchmark interleave() and full compose passes with varying chunk counts.

use std::sync::Arc;

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use flavmux_media::{
    interleave,
    testing::{sound_track, video_track, FixtureBuilder},
    BoxTree, Chunk, ComposeOptions, Composer, MediaKind, MemorySink, Sample, TrackChunks,
};

fn make_chunks(kind: MediaKind, count: usize, duration: u64, size: usize) -> Vec<Chunk> {
    (0..count as u64)
        .map(|i| Chunk {
            kind,
            samples: vec![Sample::Bytes(Bytes::from(vec![0u8; size]))],
            begin_time: i * duration,
            end_time: (i + 1) * duration,
            description_index: 1,
        })
        .collect()
}

fn bench_interleave(c: &mut Criterion) {
    let mut group = c.benchmark_group("interleave");

    for &count in &[100usize, 1_000, 10_000] {
        let video = make_chunks(MediaKind::Video, count, 1001, 64);
        let sound = make_chunks(MediaKind::Sound, count * 2, 1024, 16);
        let taste = make_chunks(MediaKind::Taste, count / 2, 2000, 5);
        group.bench_function(format!("{count}_video_chunks"), |b| {
            b.iter(|| {
                interleave(
                    TrackChunks {
                        kind: MediaKind::Video,
                        timescale: 30_000,
                        chunks: black_box(&video),
                    },
                    &[
                        TrackChunks {
                            kind: MediaKind::Sound,
                            timescale: 48_000,
                            chunks: black_box(&sound),
                        },
                        TrackChunks {
                            kind: MediaKind::Taste,
                            timescale: 30_000,
                            chunks: black_box(&taste),
                        },
                    ],
                )
            });
        });
    }

    group.finish();
}

fn bench_compose(c: &mut Criterion) {
    let mut group = c.benchmark_group("compose");

    let data = FixtureBuilder::new()
        .track(video_track(500))
        .track(sound_track(400))
        .build();
    group.bench_function("parse_and_compose_500", |b| {
        b.iter(|| {
            let sink = Arc::new(MemorySink::new());
            let tree = BoxTree::parse(black_box(data.clone()), sink.as_ref()).unwrap();
            let mut composer = Composer::new(tree, ComposeOptions::default(), sink).unwrap();
            composer.compose_all().unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_interleave, bench_compose);
criterion_main!(benches);
