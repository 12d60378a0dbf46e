//! Sample table leaves.

use bytes::{BufMut, Bytes, BytesMut};

use super::{BodyReader, FourCC, FullBoxHeader, LeafBox};
use crate::{Error, Result};

/// One sample description entry, kept opaque past its format code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleDescription {
    /// Codec identifier.
    pub format: FourCC,
    /// Entry body after size and format.
    pub data: Bytes,
}

impl SampleDescription {
    /// Description with the standard 6 reserved bytes and data reference 1.
    pub fn new(format: FourCC) -> Self {
        Self {
            format,
            data: Bytes::from_static(&[0, 0, 0, 0, 0, 0, 0, 1]),
        }
    }
}

/// Sample description box.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Stsd {
    pub header: FullBoxHeader,
    pub entries: Vec<SampleDescription>,
}

impl Stsd {
    /// Entry by 1-based description index.
    pub fn entry(&self, index: u32) -> Option<&SampleDescription> {
        let i = usize::try_from(index).ok()?.checked_sub(1)?;
        self.entries.get(i)
    }
}

impl LeafBox for Stsd {
    fn decode(box_type: FourCC, body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(box_type, body);
        let header = r.full_header()?;
        let count = r.table_len(8)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let size = r.u32()? as usize;
            if size < 8 {
                return Err(Error::invalid_mp4(format!(
                    "stsd: entry size {size} smaller than its header"
                )));
            }
            let format = r.fourcc()?;
            let data = r.bytes(size - 8)?;
            entries.push(SampleDescription { format, data });
        }
        r.finish()?;
        Ok(Self { header, entries })
    }

    fn box_type(&self) -> FourCC {
        FourCC::STSD
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.header.encode(buf);
        buf.put_u32(self.entries.len() as u32);
        for entry in &self.entries {
            buf.put_u32(8 + entry.data.len() as u32);
            buf.put_slice(&entry.format.0);
            buf.put_slice(&entry.data);
        }
    }

    fn body_len(&self) -> u64 {
        8 + self
            .entries
            .iter()
            .map(|e| 8 + e.data.len() as u64)
            .sum::<u64>()
    }
}

/// Run of samples sharing one duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SttsEntry {
    pub sample_count: u32,
    pub sample_delta: u32,
}

/// Time-to-sample box.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Stts {
    pub header: FullBoxHeader,
    pub entries: Vec<SttsEntry>,
}

impl Stts {
    pub fn new(entries: Vec<SttsEntry>) -> Self {
        Self {
            header: FullBoxHeader::default(),
            entries,
        }
    }

    pub fn sample_count(&self) -> u64 {
        self.entries.iter().map(|e| u64::from(e.sample_count)).sum()
    }
}

impl LeafBox for Stts {
    fn decode(box_type: FourCC, body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(box_type, body);
        let header = r.full_header()?;
        let count = r.table_len(8)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(SttsEntry {
                sample_count: r.u32()?,
                sample_delta: r.u32()?,
            });
        }
        r.finish()?;
        Ok(Self { header, entries })
    }

    fn box_type(&self) -> FourCC {
        FourCC::STTS
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.header.encode(buf);
        buf.put_u32(self.entries.len() as u32);
        for e in &self.entries {
            buf.put_u32(e.sample_count);
            buf.put_u32(e.sample_delta);
        }
    }

    fn body_len(&self) -> u64 {
        8 + 8 * self.entries.len() as u64
    }
}

/// Run of chunks sharing a sample count and description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StscEntry {
    /// 1-based index of the first chunk in the run.
    pub first_chunk: u32,
    pub samples_per_chunk: u32,
    /// 1-based index into the stsd entries.
    pub sample_description_index: u32,
}

/// Sample-to-chunk box.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Stsc {
    pub header: FullBoxHeader,
    pub entries: Vec<StscEntry>,
}

impl Stsc {
    pub fn new(entries: Vec<StscEntry>) -> Self {
        Self {
            header: FullBoxHeader::default(),
            entries,
        }
    }
}

impl LeafBox for Stsc {
    fn decode(box_type: FourCC, body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(box_type, body);
        let header = r.full_header()?;
        let count = r.table_len(12)?;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            entries.push(StscEntry {
                first_chunk: r.u32()?,
                samples_per_chunk: r.u32()?,
                sample_description_index: r.u32()?,
            });
        }
        r.finish()?;
        Ok(Self { header, entries })
    }

    fn box_type(&self) -> FourCC {
        FourCC::STSC
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.header.encode(buf);
        buf.put_u32(self.entries.len() as u32);
        for e in &self.entries {
            buf.put_u32(e.first_chunk);
            buf.put_u32(e.samples_per_chunk);
            buf.put_u32(e.sample_description_index);
        }
    }

    fn body_len(&self) -> u64 {
        8 + 12 * self.entries.len() as u64
    }
}

/// Sample sizes: one size for every sample, or one size per sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleSizes {
    Constant { size: u32, count: u32 },
    PerSample(Vec<u32>),
}

impl SampleSizes {
    pub fn count(&self) -> u64 {
        match self {
            SampleSizes::Constant { count, .. } => u64::from(*count),
            SampleSizes::PerSample(sizes) => sizes.len() as u64,
        }
    }

    /// Size of the sample at a 0-based index.
    pub fn get(&self, index: u64) -> Option<u32> {
        match self {
            SampleSizes::Constant { size, count } => (index < u64::from(*count)).then_some(*size),
            SampleSizes::PerSample(sizes) => sizes.get(usize::try_from(index).ok()?).copied(),
        }
    }
}

/// Sample size box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stsz {
    pub header: FullBoxHeader,
    pub sizes: SampleSizes,
}

impl Stsz {
    pub fn new(sizes: SampleSizes) -> Self {
        Self {
            header: FullBoxHeader::default(),
            sizes,
        }
    }
}

impl LeafBox for Stsz {
    fn decode(box_type: FourCC, body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(box_type, body);
        let header = r.full_header()?;
        let sample_size = r.u32()?;
        let sizes = if sample_size != 0 {
            SampleSizes::Constant {
                size: sample_size,
                count: r.u32()?,
            }
        } else {
            let count = r.table_len(4)?;
            let mut sizes = Vec::with_capacity(count);
            for _ in 0..count {
                sizes.push(r.u32()?);
            }
            SampleSizes::PerSample(sizes)
        };
        r.finish()?;
        Ok(Self { header, sizes })
    }

    fn box_type(&self) -> FourCC {
        FourCC::STSZ
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.header.encode(buf);
        match &self.sizes {
            SampleSizes::Constant { size, count } => {
                buf.put_u32(*size);
                buf.put_u32(*count);
            }
            SampleSizes::PerSample(sizes) => {
                buf.put_u32(0);
                buf.put_u32(sizes.len() as u32);
                for s in sizes {
                    buf.put_u32(*s);
                }
            }
        }
    }

    fn body_len(&self) -> u64 {
        match &self.sizes {
            SampleSizes::Constant { .. } => 12,
            SampleSizes::PerSample(sizes) => 12 + 4 * sizes.len() as u64,
        }
    }
}

/// Chunk offset box, `stco` (32-bit) or `co64` (64-bit).
///
/// Offsets are absolute file positions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkOffsets {
    pub header: FullBoxHeader,
    pub large: bool,
    pub offsets: Vec<u64>,
}

impl ChunkOffsets {
    pub fn new(offsets: Vec<u64>) -> Self {
        let large = offsets.iter().any(|o| *o > u64::from(u32::MAX));
        Self {
            header: FullBoxHeader::default(),
            large,
            offsets,
        }
    }

    /// `count` zero offsets, to be filled in once the payload layout is known.
    pub fn placeholder(count: usize) -> Self {
        Self::new(vec![0; count])
    }
}

impl LeafBox for ChunkOffsets {
    fn decode(box_type: FourCC, body: Bytes) -> Result<Self> {
        let large = box_type == FourCC::CO64;
        let mut r = BodyReader::new(box_type, body);
        let header = r.full_header()?;
        let count = r.table_len(if large { 8 } else { 4 })?;
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            offsets.push(if large { r.u64()? } else { u64::from(r.u32()?) });
        }
        r.finish()?;
        Ok(Self {
            header,
            large,
            offsets,
        })
    }

    fn box_type(&self) -> FourCC {
        if self.large {
            FourCC::CO64
        } else {
            FourCC::STCO
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.header.encode(buf);
        buf.put_u32(self.offsets.len() as u32);
        for o in &self.offsets {
            if self.large {
                buf.put_u64(*o);
            } else {
                buf.put_u32(*o as u32);
            }
        }
    }

    fn body_len(&self) -> u64 {
        let width = if self.large { 8 } else { 4 };
        8 + width * self.offsets.len() as u64
    }
}
