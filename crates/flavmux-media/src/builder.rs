//! Sample table and track box construction for ingested media.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::boxes::{
    ChunkOffsets, FourCC, FullBoxHeader, Hdlr, Mdhd, Mp4Box, SampleDescription, SampleSizes, Stsc,
    StscEntry, Stsd, Stsz, Stts, SttsEntry, Tkhd, IDENTITY_MATRIX,
};
use crate::sample_table::{Chunk, Sample};
use crate::track::MediaKind;

/// Ticks per ingested sample.
pub const DEFAULT_SAMPLE_DELTA: u32 = 1000;

/// Samples per chunk when none is configured.
pub const DEFAULT_CHUNK_SAMPLES: usize = 50;

/// Seconds from 1904-01-01 to 1970-01-01.
const MP4_EPOCH_OFFSET: u64 = 2_082_844_800;

/// Seconds since 1904-01-01, the epoch of MP4 header timestamps.
pub fn mp4_timestamp(at: DateTime<Utc>) -> u64 {
    u64::try_from(at.timestamp()).unwrap_or(0) + MP4_EPOCH_OFFSET
}

/// Group sample payloads into chunks of `chunk_size`; the last chunk may be
/// shorter. Every sample lasts `delta` ticks.
pub fn chunk_samples(kind: MediaKind, payloads: Vec<Bytes>, delta: u32, chunk_size: usize) -> Vec<Chunk> {
    let chunk_size = chunk_size.max(1);
    let delta = u64::from(delta);
    let mut chunks = Vec::with_capacity(payloads.len().div_ceil(chunk_size));
    let mut first_sample = 0u64;
    let mut payloads = payloads.into_iter().peekable();
    while payloads.peek().is_some() {
        let samples: Vec<Sample> = payloads.by_ref().take(chunk_size).map(Sample::Bytes).collect();
        let count = samples.len() as u64;
        chunks.push(Chunk {
            kind,
            samples,
            begin_time: first_sample * delta,
            end_time: (first_sample + count) * delta,
            description_index: 1,
        });
        first_sample += count;
    }
    chunks
}

/// Run-length code per-chunk `(samples, description index)` pairs. A new
/// run starts whenever either value changes.
pub fn coalesce_sample_to_chunk(chunks: &[(u32, u32)]) -> Vec<StscEntry> {
    let mut runs: Vec<StscEntry> = Vec::new();
    for (i, &(samples, description)) in chunks.iter().enumerate() {
        let same = runs.last().is_some_and(|run| {
            run.samples_per_chunk == samples && run.sample_description_index == description
        });
        if !same {
            runs.push(StscEntry {
                first_chunk: i as u32 + 1,
                samples_per_chunk: samples,
                sample_description_index: description,
            });
        }
    }
    runs
}

/// Run-length code per-sample durations.
pub fn coalesce_time_to_sample(deltas: &[u32]) -> Vec<SttsEntry> {
    let mut runs: Vec<SttsEntry> = Vec::new();
    for &delta in deltas {
        match runs.last_mut() {
            Some(run) if run.sample_delta == delta => run.sample_count += 1,
            _ => runs.push(SttsEntry {
                sample_count: 1,
                sample_delta: delta,
            }),
        }
    }
    runs
}

/// One global size when every sample has the same length, otherwise a
/// per-sample table.
pub fn collapse_sample_sizes(sizes: &[u32]) -> SampleSizes {
    match sizes.split_first() {
        Some((&first, rest)) if first != 0 && rest.iter().all(|s| *s == first) => {
            SampleSizes::Constant {
                size: first,
                count: sizes.len() as u32,
            }
        }
        _ => SampleSizes::PerSample(sizes.to_vec()),
    }
}

/// Build an `stbl` for chunks whose samples all last `delta` ticks.
///
/// The chunk offset table holds one zero per chunk until the track is
/// composed.
pub fn build_sample_table(chunks: &[Chunk], delta: u32, codec: FourCC) -> Mp4Box {
    let per_chunk: Vec<(u32, u32)> = chunks
        .iter()
        .map(|c| (c.samples.len() as u32, c.description_index))
        .collect();
    let sizes: Vec<u32> = chunks
        .iter()
        .flat_map(|c| c.samples.iter().map(|s| s.len() as u32))
        .collect();
    let deltas = vec![delta; sizes.len()];

    let stsd = Stsd {
        header: FullBoxHeader::default(),
        entries: vec![SampleDescription::new(codec)],
    };

    Mp4Box::container(
        FourCC::STBL,
        vec![
            Mp4Box::leaf(stsd),
            Mp4Box::leaf(Stts::new(coalesce_time_to_sample(&deltas))),
            Mp4Box::leaf(Stsc::new(coalesce_sample_to_chunk(&per_chunk))),
            Mp4Box::leaf(Stsz::new(collapse_sample_sizes(&sizes))),
            Mp4Box::leaf(ChunkOffsets::placeholder(chunks.len())),
        ],
    )
}

/// Parameters of a new track box.
#[derive(Debug, Clone)]
pub struct TrackBuilder {
    pub kind: MediaKind,
    pub track_id: u32,
    /// Media timescale.
    pub timescale: u32,
    /// In media timescale ticks.
    pub media_duration: u64,
    /// In movie timescale ticks.
    pub track_duration: u64,
    pub handler_name: String,
    pub creation_time: DateTime<Utc>,
}

impl TrackBuilder {
    /// Assemble `trak` around a sample table built by [`build_sample_table`].
    pub fn build(&self, stbl: Mp4Box) -> Mp4Box {
        let now = mp4_timestamp(self.creation_time);

        let tkhd = Tkhd {
            header: FullBoxHeader::new(0, Tkhd::DEFAULT_FLAGS),
            creation_time: now,
            modification_time: now,
            track_id: self.track_id,
            reserved: 0,
            duration: self.track_duration,
            reserved2: [0; 8],
            layer: 0,
            alternate_group: 0,
            volume: 0,
            reserved3: 0,
            matrix: IDENTITY_MATRIX,
            width: 0,
            height: 0,
        };

        let mdhd = Mdhd {
            header: FullBoxHeader::default(),
            creation_time: now,
            modification_time: now,
            timescale: self.timescale,
            duration: self.media_duration,
            language: Mdhd::UNDETERMINED_LANGUAGE,
            pre_defined: 0,
        };

        let minf = Mp4Box::container(
            FourCC::MINF,
            vec![
                Mp4Box::raw(FourCC::NMHD, Bytes::from_static(&[0, 0, 0, 0])),
                Mp4Box::container(FourCC::DINF, vec![self_contained_dref()]),
                stbl,
            ],
        );

        let mdia = Mp4Box::container(
            FourCC::MDIA,
            vec![
                Mp4Box::leaf(mdhd),
                Mp4Box::leaf(Hdlr::new(self.kind.handler_type(), &self.handler_name)),
                minf,
            ],
        );

        Mp4Box::container(
            FourCC::TRAK,
            vec![
                Mp4Box::leaf(tkhd),
                Mp4Box::container(FourCC::EDTS, vec![edit_list(self.track_duration)]),
                mdia,
            ],
        )
    }
}

/// `elst` with one edit covering the whole track at normal rate.
fn edit_list(track_duration: u64) -> Mp4Box {
    let mut body = BytesMut::new();
    let wide = track_duration > u64::from(u32::MAX);
    FullBoxHeader::new(u8::from(wide), 0).encode(&mut body);
    body.put_u32(1);
    if wide {
        body.put_u64(track_duration);
        body.put_i64(0);
    } else {
        body.put_u32(track_duration as u32);
        body.put_i32(0);
    }
    body.put_u16(1);
    body.put_u16(0);
    Mp4Box::raw(FourCC::ELST, body.freeze())
}

/// `dref` holding one `url ` entry flagged as "media in this file".
fn self_contained_dref() -> Mp4Box {
    let mut url = BytesMut::new();
    FullBoxHeader::new(0, 1).encode(&mut url);
    let url = Mp4Box::raw(FourCC::URL, url.freeze());

    let mut body = BytesMut::new();
    FullBoxHeader::default().encode(&mut body);
    body.put_u32(1);
    url.encode(&mut body);
    Mp4Box::raw(FourCC::DREF, body.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_table::expand_time_to_sample;
    use chrono::TimeZone;

    fn payloads(sizes: &[usize]) -> Vec<Bytes> {
        sizes.iter().map(|n| Bytes::from(vec![7u8; *n])).collect()
    }

    #[test]
    fn test_chunk_samples_final_chunk_shorter() {
        let chunks = chunk_samples(MediaKind::Taste, payloads(&[5, 5, 5, 5, 5]), 1000, 2);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].samples.len(), 1);
        assert_eq!(chunks[1].begin_time, 2000);
        assert_eq!(chunks[1].end_time, 4000);
        assert_eq!(chunks[2].end_time, 5000);
    }

    #[test]
    fn test_chunk_samples_empty_input() {
        assert!(chunk_samples(MediaKind::Scent, Vec::new(), 1000, 50).is_empty());
    }

    #[test]
    fn test_coalesce_sample_to_chunk() {
        let runs = coalesce_sample_to_chunk(&[(2, 1), (2, 1), (1, 1)]);
        assert_eq!(
            runs,
            vec![
                StscEntry {
                    first_chunk: 1,
                    samples_per_chunk: 2,
                    sample_description_index: 1
                },
                StscEntry {
                    first_chunk: 3,
                    samples_per_chunk: 1,
                    sample_description_index: 1
                },
            ]
        );
    }

    #[test]
    fn test_description_change_starts_run() {
        let runs = coalesce_sample_to_chunk(&[(2, 1), (2, 2)]);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].first_chunk, 2);
    }

    #[test]
    fn test_coalesce_time_to_sample_roundtrip() {
        let deltas = [10, 10, 10, 20, 10];
        let runs = coalesce_time_to_sample(&deltas);
        assert_eq!(runs.len(), 3);
        assert_eq!(expand_time_to_sample(&runs), deltas.to_vec());
    }

    #[test]
    fn test_collapse_sample_sizes() {
        assert_eq!(
            collapse_sample_sizes(&[5, 5, 5]),
            SampleSizes::Constant { size: 5, count: 3 }
        );
        assert_eq!(
            collapse_sample_sizes(&[5, 6]),
            SampleSizes::PerSample(vec![5, 6])
        );
        assert_eq!(collapse_sample_sizes(&[]), SampleSizes::PerSample(vec![]));
        assert_eq!(
            collapse_sample_sizes(&[0, 0]),
            SampleSizes::PerSample(vec![0, 0])
        );
    }

    #[test]
    fn test_build_sample_table_layout() {
        let chunks = chunk_samples(MediaKind::Taste, payloads(&[5, 5, 5]), 1000, 2);
        let stbl = build_sample_table(&chunks, 1000, FourCC(*b"raw5"));
        let stts = stbl.child(FourCC::STTS).and_then(Mp4Box::as_stts).unwrap();
        assert_eq!(
            stts.entries,
            vec![SttsEntry {
                sample_count: 3,
                sample_delta: 1000
            }]
        );
        let stco = stbl.child(FourCC::STCO).and_then(Mp4Box::as_chunk_offsets).unwrap();
        assert_eq!(stco.offsets, vec![0, 0]);
        let stsd = stbl.child(FourCC::STSD).and_then(Mp4Box::as_stsd).unwrap();
        assert_eq!(stsd.entries[0].format, FourCC(*b"raw5"));
    }

    #[test]
    fn test_track_builder_layout() {
        let chunks = chunk_samples(MediaKind::Scent, payloads(&[4]), 1000, 50);
        let stbl = build_sample_table(&chunks, 1000, FourCC(*b"rmix"));
        let trak = TrackBuilder {
            kind: MediaKind::Scent,
            track_id: 3,
            timescale: 30_000,
            media_duration: 1000,
            track_duration: 20,
            handler_name: "TTTV3".to_string(),
            creation_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
        .build(stbl);

        assert_eq!(trak.box_type, FourCC::TRAK);
        let tkhd = trak.child(FourCC::TKHD).and_then(Mp4Box::as_tkhd).unwrap();
        assert_eq!(tkhd.track_id, 3);
        assert_eq!(tkhd.duration, 20);
        let hdlr = trak
            .path(&[FourCC::MDIA, FourCC::HDLR])
            .and_then(Mp4Box::as_hdlr)
            .unwrap();
        assert_eq!(hdlr.handler_type, FourCC(*b"scnt"));
        assert_eq!(hdlr.name_lossy(), "TTTV3");
        assert!(trak
            .path(&[FourCC::MDIA, FourCC::MINF, FourCC::NMHD])
            .is_some());
        assert!(trak
            .path(&[FourCC::MDIA, FourCC::MINF, FourCC::STBL, FourCC::STSZ])
            .is_some());
        assert!(trak.path(&[FourCC::EDTS, FourCC::ELST]).is_some());
    }

    #[test]
    fn test_mp4_timestamp_epoch() {
        let unix_epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(mp4_timestamp(unix_epoch), 2_082_844_800);
    }
}
