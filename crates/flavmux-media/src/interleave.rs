//! Time-ordered interleaving of chunks from several tracks.
//!
//! One track is the criteria: its chunks are laid out in order, and right
//! after each one every pending target chunk that starts no later than that
//! criteria chunk ends is emitted. Times are compared as exact rationals
//! (`begin / ts_target <= end / ts_criteria`) by cross-multiplying.

use std::collections::BTreeMap;

use crate::sample_table::Chunk;
use crate::track::MediaKind;

/// Chunks of one track together with its timescale.
#[derive(Debug, Clone, Copy)]
pub struct TrackChunks<'a> {
    pub kind: MediaKind,
    pub timescale: u32,
    pub chunks: &'a [Chunk],
}

/// Output layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Interleaved {
    /// `(kind, chunk index)` in payload order.
    pub order: Vec<(MediaKind, usize)>,
    /// Payload-relative offset of each chunk, in chunk order, per kind. Kinds
    /// with no chunks have no entry.
    pub offsets: BTreeMap<MediaKind, Vec<u64>>,
    pub total_size: u64,
}

/// Pick the criteria track: the first kind in `priority` whose track has
/// chunks. Kinds missing from `priority` are considered afterwards in their
/// natural order.
pub fn select_criteria(priority: &[MediaKind], candidates: &[TrackChunks<'_>]) -> Option<MediaKind> {
    priority
        .iter()
        .copied()
        .chain(MediaKind::ALL.into_iter().filter(|k| !priority.contains(k)))
        .find(|kind| {
            candidates
                .iter()
                .any(|t| t.kind == *kind && !t.chunks.is_empty())
        })
}

/// `begin / target_ts <= end / criteria_ts`, exactly.
fn starts_by(begin: u64, target_ts: u32, end: u64, criteria_ts: u32) -> bool {
    u128::from(begin) * u128::from(criteria_ts) <= u128::from(end) * u128::from(target_ts)
}

struct Layout {
    order: Vec<(MediaKind, usize)>,
    offsets: BTreeMap<MediaKind, Vec<u64>>,
    position: u64,
}

impl Layout {
    fn place(&mut self, kind: MediaKind, index: usize, chunk: &Chunk) {
        self.order.push((kind, index));
        self.offsets.entry(kind).or_default().push(self.position);
        self.position += chunk.size();
    }
}

/// Lay out `criteria` and `targets` into one payload.
///
/// Each target's chunks keep their relative order. Target chunks left over
/// after the last criteria chunk are appended, target by target.
pub fn interleave(criteria: TrackChunks<'_>, targets: &[TrackChunks<'_>]) -> Interleaved {
    let mut layout = Layout {
        order: Vec::new(),
        offsets: BTreeMap::new(),
        position: 0,
    };
    let mut cursors = vec![0usize; targets.len()];

    for (ci, chunk) in criteria.chunks.iter().enumerate() {
        layout.place(criteria.kind, ci, chunk);
        for (target, cursor) in targets.iter().zip(cursors.iter_mut()) {
            while let Some(next) = target.chunks.get(*cursor) {
                if !starts_by(next.begin_time, target.timescale, chunk.end_time, criteria.timescale) {
                    break;
                }
                layout.place(target.kind, *cursor, next);
                *cursor += 1;
            }
        }
    }

    for (target, cursor) in targets.iter().zip(cursors) {
        for (ti, chunk) in target.chunks.iter().enumerate().skip(cursor) {
            layout.place(target.kind, ti, chunk);
        }
    }

    Interleaved {
        order: layout.order,
        offsets: layout.offsets,
        total_size: layout.position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_table::Sample;
    use bytes::Bytes;

    fn chunk(kind: MediaKind, begin: u64, end: u64, size: usize) -> Chunk {
        Chunk {
            kind,
            samples: vec![Sample::Bytes(Bytes::from(vec![0u8; size]))],
            begin_time: begin,
            end_time: end,
            description_index: 1,
        }
    }

    #[test]
    fn test_video_sound_alternate() {
        let video = vec![
            chunk(MediaKind::Video, 0, 1000, 10),
            chunk(MediaKind::Video, 1000, 2000, 10),
        ];
        let sound = vec![
            chunk(MediaKind::Sound, 500, 1500, 4),
            chunk(MediaKind::Sound, 1500, 2500, 4),
        ];
        let criteria = TrackChunks {
            kind: MediaKind::Video,
            timescale: 1000,
            chunks: &video,
        };
        let targets = [TrackChunks {
            kind: MediaKind::Sound,
            timescale: 1000,
            chunks: &sound,
        }];
        let out = interleave(criteria, &targets);
        assert_eq!(
            out.order,
            vec![
                (MediaKind::Video, 0),
                (MediaKind::Sound, 0),
                (MediaKind::Video, 1),
                (MediaKind::Sound, 1),
            ]
        );
        assert_eq!(out.offsets[&MediaKind::Video], vec![0, 14]);
        assert_eq!(out.offsets[&MediaKind::Sound], vec![10, 24]);
        assert_eq!(out.total_size, 28);
    }

    #[test]
    fn test_mixed_timescales_compare_in_seconds() {
        let video = vec![
            chunk(MediaKind::Video, 0, 1000, 10),
            chunk(MediaKind::Video, 1000, 2000, 10),
        ];
        // Begins at exactly 1s, so it belongs after the first video chunk.
        let sound = vec![chunk(MediaKind::Sound, 44100, 88200, 4)];
        let out = interleave(
            TrackChunks {
                kind: MediaKind::Video,
                timescale: 1000,
                chunks: &video,
            },
            &[TrackChunks {
                kind: MediaKind::Sound,
                timescale: 44100,
                chunks: &sound,
            }],
        );
        assert_eq!(
            out.order,
            vec![
                (MediaKind::Video, 0),
                (MediaKind::Sound, 0),
                (MediaKind::Video, 1),
            ]
        );
    }

    #[test]
    fn test_boundary_is_inclusive_for_thirds() {
        let video = vec![chunk(MediaKind::Video, 0, 3, 1), chunk(MediaKind::Video, 3, 6, 1)];
        // 1/3 s in a timescale of 3 against a criteria end of 3/9 s.
        let taste = vec![chunk(MediaKind::Taste, 1, 2, 1)];
        let out = interleave(
            TrackChunks {
                kind: MediaKind::Video,
                timescale: 9,
                chunks: &video,
            },
            &[TrackChunks {
                kind: MediaKind::Taste,
                timescale: 3,
                chunks: &taste,
            }],
        );
        assert_eq!(
            out.order,
            vec![
                (MediaKind::Video, 0),
                (MediaKind::Taste, 0),
                (MediaKind::Video, 1),
            ]
        );
    }

    #[test]
    fn test_leftover_targets_flushed_in_order() {
        let video = vec![chunk(MediaKind::Video, 0, 10, 1)];
        let scent = vec![
            chunk(MediaKind::Scent, 20, 30, 2),
            chunk(MediaKind::Scent, 30, 40, 2),
        ];
        let out = interleave(
            TrackChunks {
                kind: MediaKind::Video,
                timescale: 10,
                chunks: &video,
            },
            &[TrackChunks {
                kind: MediaKind::Scent,
                timescale: 10,
                chunks: &scent,
            }],
        );
        assert_eq!(
            out.order,
            vec![
                (MediaKind::Video, 0),
                (MediaKind::Scent, 0),
                (MediaKind::Scent, 1)
            ]
        );
        assert_eq!(out.offsets[&MediaKind::Scent], vec![1, 3]);
    }

    #[test]
    fn test_empty_target_gets_no_offsets() {
        let video = vec![chunk(MediaKind::Video, 0, 10, 1)];
        let out = interleave(
            TrackChunks {
                kind: MediaKind::Video,
                timescale: 10,
                chunks: &video,
            },
            &[TrackChunks {
                kind: MediaKind::Taste,
                timescale: 10,
                chunks: &[],
            }],
        );
        assert!(!out.offsets.contains_key(&MediaKind::Taste));
        assert_eq!(out.order.len(), 1);
    }

    #[test]
    fn test_select_criteria_skips_empty_tracks() {
        let sound = vec![chunk(MediaKind::Sound, 0, 1, 1)];
        let candidates = [
            TrackChunks {
                kind: MediaKind::Video,
                timescale: 1,
                chunks: &[],
            },
            TrackChunks {
                kind: MediaKind::Sound,
                timescale: 1,
                chunks: &sound,
            },
        ];
        assert_eq!(
            select_criteria(&MediaKind::ALL, &candidates),
            Some(MediaKind::Sound)
        );
        assert_eq!(select_criteria(&MediaKind::ALL, &candidates[..1]), None);
    }

    #[test]
    fn test_select_criteria_custom_priority() {
        let video = vec![chunk(MediaKind::Video, 0, 1, 1)];
        let taste = vec![chunk(MediaKind::Taste, 0, 1, 1)];
        let candidates = [
            TrackChunks {
                kind: MediaKind::Video,
                timescale: 1,
                chunks: &video,
            },
            TrackChunks {
                kind: MediaKind::Taste,
                timescale: 1,
                chunks: &taste,
            },
        ];
        assert_eq!(
            select_criteria(&[MediaKind::Taste], &candidates),
            Some(MediaKind::Taste)
        );
        assert_eq!(
            select_criteria(&[MediaKind::Scent], &candidates),
            Some(MediaKind::Video)
        );
    }
}
