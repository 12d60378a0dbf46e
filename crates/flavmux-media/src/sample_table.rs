//! Chunk decoding from sample tables.
//!
//! The tables involved:
//! - stts: sample durations, run-length coded
//! - stsc: samples per chunk, run-length coded by first chunk
//! - stsz: sample sizes
//! - stco/co64: absolute chunk offsets
//!
//! Chunks are decoded in chunk order. Each sample's bytes are located at the
//! chunk offset (relative to the `mdat` payload) plus the sizes of the samples
//! before it in the same chunk.

use bytes::Bytes;

use crate::boxes::{Mdat, SttsEntry, StscEntry};
use crate::track::{MediaKind, SampleTableView};
use crate::{Error, Result};

/// How sample payloads are held after decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeMode {
    /// Slice sample bytes out of the payload.
    #[default]
    Eager,
    /// Keep only `(offset, length)`; bytes are copied when the output is
    /// composed.
    Streaming,
}

/// Sample payload, held or referenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sample {
    Bytes(Bytes),
    /// Absolute file offset and length in the source file.
    Ref { offset: u64, len: u32 },
}

impl Sample {
    pub fn len(&self) -> u64 {
        match self {
            Sample::Bytes(b) => b.len() as u64,
            Sample::Ref { len, .. } => u64::from(*len),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample bytes, reading references out of `mdat`.
    pub fn resolve(&self, mdat: &Mdat) -> Result<Bytes> {
        match self {
            Sample::Bytes(b) => Ok(b.clone()),
            Sample::Ref { offset, len } => {
                let start = offset
                    .checked_sub(mdat.data_offset)
                    .ok_or_else(|| Error::inconsistent(format!("sample at {offset} precedes mdat")))?;
                let end = start
                    .checked_add(u64::from(*len))
                    .filter(|&end| end <= mdat.payload.len() as u64)
                    .ok_or_else(|| {
                        Error::inconsistent(format!("sample at {offset} runs past the end of mdat"))
                    })?;
                Ok(mdat.payload.slice(start as usize..end as usize))
            }
        }
    }
}

/// A run of contiguous samples of one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub kind: MediaKind,
    pub samples: Vec<Sample>,
    /// Start time of the first sample, in media timescale ticks.
    pub begin_time: u64,
    /// End time of the last sample, in media timescale ticks.
    pub end_time: u64,
    /// 1-based index into the track's sample descriptions.
    pub description_index: u32,
}

impl Chunk {
    /// Total payload bytes.
    pub fn size(&self) -> u64 {
        self.samples.iter().map(Sample::len).sum()
    }
}

/// Start time of the 0-based sample `index`. Indices past the table end
/// clamp to the total duration.
pub fn time_of_sample(stts: &[SttsEntry], index: u64) -> u64 {
    let mut time = 0u64;
    let mut remaining = index;
    for run in stts {
        let count = u64::from(run.sample_count);
        if remaining < count {
            return time + remaining * u64::from(run.sample_delta);
        }
        time += count * u64::from(run.sample_delta);
        remaining -= count;
    }
    time
}

/// End time (start plus duration) of the 0-based sample `index`.
pub fn end_time_of_sample(stts: &[SttsEntry], index: u64) -> u64 {
    let mut time = 0u64;
    let mut remaining = index;
    for run in stts {
        let count = u64::from(run.sample_count);
        if remaining < count {
            return time + (remaining + 1) * u64::from(run.sample_delta);
        }
        time += count * u64::from(run.sample_delta);
        remaining -= count;
    }
    time
}

/// Per-sample durations.
pub fn expand_time_to_sample(stts: &[SttsEntry]) -> Vec<u32> {
    stts.iter()
        .flat_map(|run| std::iter::repeat(run.sample_delta).take(run.sample_count as usize))
        .collect()
}

/// Per-chunk `(samples, description index)` for `chunk_count` chunks.
pub fn expand_sample_to_chunk(stsc: &[StscEntry], chunk_count: usize) -> Vec<(u32, u32)> {
    let mut out = Vec::with_capacity(chunk_count);
    let mut cursor = 0;
    let mut current = (0, 1);
    for chunk in 1..=chunk_count {
        if let Some(run) = stsc.get(cursor) {
            if run.first_chunk as usize == chunk {
                current = (run.samples_per_chunk, run.sample_description_index);
                cursor += 1;
            }
        }
        out.push(current);
    }
    out
}

/// Decode every chunk of a track.
///
/// An empty sample-to-chunk table yields no chunks. Any chunk or sample that
/// does not land inside the `mdat` payload is an error.
pub fn decode_chunks(
    table: &SampleTableView<'_>,
    mdat: &Mdat,
    kind: MediaKind,
    mode: DecodeMode,
) -> Result<Vec<Chunk>> {
    let stsc = &table.sample_to_chunk()?.entries;
    if stsc.is_empty() {
        return Ok(Vec::new());
    }
    let stts = &table.time_to_sample()?.entries;
    let sizes = &table.sample_sizes()?.sizes;
    let offsets = &table.chunk_offsets()?.offsets;
    let payload_len = mdat.payload.len() as u64;

    let mut chunks = Vec::with_capacity(offsets.len());
    let mut sample_index = 0u64;
    for (i, (&chunk_offset, (per_chunk, description_index))) in offsets
        .iter()
        .zip(expand_sample_to_chunk(stsc, offsets.len()))
        .enumerate()
    {
        let relative = chunk_offset.checked_sub(mdat.data_offset).ok_or_else(|| {
            Error::inconsistent(format!(
                "{kind} chunk {} at offset {chunk_offset} precedes mdat payload at {}",
                i + 1,
                mdat.data_offset
            ))
        })?;

        let begin_time = time_of_sample(stts, sample_index);
        let mut samples = Vec::with_capacity(per_chunk as usize);
        let mut intra = 0u64;
        for _ in 0..per_chunk {
            let size = sizes.get(sample_index).ok_or_else(|| {
                Error::inconsistent(format!(
                    "{kind} chunk {} needs sample {sample_index} but stsz has {}",
                    i + 1,
                    sizes.count()
                ))
            })?;
            let start = relative.checked_add(intra);
            let end = start.and_then(|s| s.checked_add(u64::from(size)));
            let (start, end) = match (start, end) {
                (Some(start), Some(end)) if end <= payload_len => (start, end),
                _ => {
                    return Err(Error::inconsistent(format!(
                        "{kind} sample {sample_index} of chunk {} at offset {chunk_offset} runs past mdat ({payload_len} bytes)",
                        i + 1
                    )))
                }
            };
            samples.push(match mode {
                DecodeMode::Eager => Sample::Bytes(mdat.payload.slice(start as usize..end as usize)),
                DecodeMode::Streaming => Sample::Ref {
                    offset: mdat.data_offset + start,
                    len: size,
                },
            });
            intra += u64::from(size);
            sample_index += 1;
        }

        let end_time = if per_chunk == 0 {
            begin_time
        } else {
            end_time_of_sample(stts, sample_index - 1)
        };
        chunks.push(Chunk {
            kind,
            samples,
            begin_time,
            end_time,
            description_index,
        });
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn stts(runs: &[(u32, u32)]) -> Vec<SttsEntry> {
        runs.iter()
            .map(|&(sample_count, sample_delta)| SttsEntry {
                sample_count,
                sample_delta,
            })
            .collect()
    }

    #[test]
    fn test_time_of_sample_across_runs() {
        let table = stts(&[(2, 10), (3, 20)]);
        assert_eq!(time_of_sample(&table, 0), 0);
        assert_eq!(time_of_sample(&table, 1), 10);
        assert_eq!(time_of_sample(&table, 2), 20);
        assert_eq!(time_of_sample(&table, 4), 60);
        assert_eq!(end_time_of_sample(&table, 1), 20);
        assert_eq!(end_time_of_sample(&table, 4), 80);
    }

    #[test]
    fn test_time_past_table_end_clamps() {
        let table = stts(&[(2, 10)]);
        assert_eq!(time_of_sample(&table, 7), 20);
        assert_eq!(end_time_of_sample(&table, 7), 20);
        assert_eq!(time_of_sample(&[], 3), 0);
    }

    #[test]
    fn test_expand_tables() {
        assert_eq!(expand_time_to_sample(&stts(&[(2, 10), (1, 5)])), vec![10, 10, 5]);

        let stsc = vec![
            StscEntry {
                first_chunk: 1,
                samples_per_chunk: 2,
                sample_description_index: 1,
            },
            StscEntry {
                first_chunk: 3,
                samples_per_chunk: 1,
                sample_description_index: 2,
            },
        ];
        assert_eq!(
            expand_sample_to_chunk(&stsc, 4),
            vec![(2, 1), (2, 1), (1, 2), (1, 2)]
        );
    }

    #[test]
    fn test_sample_resolve_reference() {
        let mdat = Mdat {
            payload: Bytes::from_static(b"abcdef"),
            data_offset: 100,
        };
        let s = Sample::Ref {
            offset: 102,
            len: 3,
        };
        assert_eq!(&s.resolve(&mdat).unwrap()[..], b"cde");
        assert!(Sample::Ref { offset: 99, len: 1 }.resolve(&mdat).is_err());
        assert!(Sample::Ref { offset: 105, len: 2 }.resolve(&mdat).is_err());
        assert_matches!(
            Sample::Ref {
                offset: u64::MAX,
                len: 1
            }
            .resolve(&mdat),
            Err(Error::InconsistentTable(_))
        );
    }
}
