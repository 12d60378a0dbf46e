//! File, movie, track and media level leaves.

use bytes::{BufMut, Bytes, BytesMut};

use super::{BodyReader, FourCC, FullBoxHeader, LeafBox};
use crate::{Error, Result};

/// Unity transform matrix in 16.16 / 2.30 fixed point.
pub const IDENTITY_MATRIX: [u8; 36] = identity_matrix();

const fn identity_matrix() -> [u8; 36] {
    let values: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];
    let mut out = [0u8; 36];
    let mut i = 0;
    while i < 9 {
        let b = values[i].to_be_bytes();
        out[i * 4] = b[0];
        out[i * 4 + 1] = b[1];
        out[i * 4 + 2] = b[2];
        out[i * 4 + 3] = b[3];
        i += 1;
    }
    out
}

fn put_versioned(buf: &mut BytesMut, wide: bool, value: u64) {
    if wide {
        buf.put_u64(value);
    } else {
        buf.put_u32(value as u32);
    }
}

fn needs_wide(header: &FullBoxHeader, values: &[u64]) -> bool {
    header.version == 1 || values.iter().any(|v| *v > u64::from(u32::MAX))
}

/// File type box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ftyp {
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

impl LeafBox for Ftyp {
    fn decode(box_type: FourCC, body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(box_type, body);
        let major_brand = r.fourcc()?;
        let minor_version = r.u32()?;
        if r.remaining() % 4 != 0 {
            return Err(Error::invalid_mp4("ftyp: brand list is not a multiple of 4 bytes"));
        }
        let mut compatible_brands = Vec::with_capacity(r.remaining() / 4);
        while r.remaining() > 0 {
            compatible_brands.push(r.fourcc()?);
        }
        Ok(Self {
            major_brand,
            minor_version,
            compatible_brands,
        })
    }

    fn box_type(&self) -> FourCC {
        FourCC::FTYP
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.major_brand.0);
        buf.put_u32(self.minor_version);
        for brand in &self.compatible_brands {
            buf.put_slice(&brand.0);
        }
    }

    fn body_len(&self) -> u64 {
        8 + 4 * self.compatible_brands.len() as u64
    }
}

/// Media data box.
///
/// `data_offset` is the absolute file position of the first payload byte. It
/// is set by the tree parser and refreshed after every compose.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Mdat {
    pub payload: Bytes,
    pub data_offset: u64,
}

impl LeafBox for Mdat {
    fn decode(_box_type: FourCC, body: Bytes) -> Result<Self> {
        Ok(Self {
            payload: body,
            data_offset: 0,
        })
    }

    fn box_type(&self) -> FourCC {
        FourCC::MDAT
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.payload);
    }

    fn body_len(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// Movie header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mvhd {
    pub header: FullBoxHeader,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    /// 16.16 fixed point.
    pub rate: u32,
    /// 8.8 fixed point.
    pub volume: u16,
    pub reserved: [u8; 10],
    pub matrix: [u8; 36],
    pub pre_defined: [u8; 24],
    pub next_track_id: u32,
}

impl Mvhd {
    fn wide(&self) -> bool {
        needs_wide(
            &self.header,
            &[self.creation_time, self.modification_time, self.duration],
        )
    }
}

impl LeafBox for Mvhd {
    fn decode(box_type: FourCC, body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(box_type, body);
        let header = r.full_header()?;
        let creation_time = r.versioned(header.version)?;
        let modification_time = r.versioned(header.version)?;
        let timescale = r.u32()?;
        let duration = r.versioned(header.version)?;
        let mvhd = Self {
            header,
            creation_time,
            modification_time,
            timescale,
            duration,
            rate: r.u32()?,
            volume: r.u16()?,
            reserved: r.array()?,
            matrix: r.array()?,
            pre_defined: r.array()?,
            next_track_id: r.u32()?,
        };
        r.finish()?;
        Ok(mvhd)
    }

    fn box_type(&self) -> FourCC {
        FourCC::MVHD
    }

    fn encode(&self, buf: &mut BytesMut) {
        let wide = self.wide();
        FullBoxHeader::new(u8::from(wide), self.header.flags).encode(buf);
        put_versioned(buf, wide, self.creation_time);
        put_versioned(buf, wide, self.modification_time);
        buf.put_u32(self.timescale);
        put_versioned(buf, wide, self.duration);
        buf.put_u32(self.rate);
        buf.put_u16(self.volume);
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.matrix);
        buf.put_slice(&self.pre_defined);
        buf.put_u32(self.next_track_id);
    }

    fn body_len(&self) -> u64 {
        if self.wide() {
            112
        } else {
            100
        }
    }
}

/// Track header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tkhd {
    pub header: FullBoxHeader,
    pub creation_time: u64,
    pub modification_time: u64,
    pub track_id: u32,
    pub reserved: u32,
    pub duration: u64,
    pub reserved2: [u8; 8],
    pub layer: u16,
    pub alternate_group: u16,
    pub volume: u16,
    pub reserved3: u16,
    pub matrix: [u8; 36],
    /// 16.16 fixed point.
    pub width: u32,
    /// 16.16 fixed point.
    pub height: u32,
}

impl Tkhd {
    /// Track enabled and used in the presentation.
    pub const DEFAULT_FLAGS: u32 = 0x000003;

    fn wide(&self) -> bool {
        needs_wide(
            &self.header,
            &[self.creation_time, self.modification_time, self.duration],
        )
    }
}

impl LeafBox for Tkhd {
    fn decode(box_type: FourCC, body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(box_type, body);
        let header = r.full_header()?;
        let creation_time = r.versioned(header.version)?;
        let modification_time = r.versioned(header.version)?;
        let track_id = r.u32()?;
        let reserved = r.u32()?;
        let duration = r.versioned(header.version)?;
        let tkhd = Self {
            header,
            creation_time,
            modification_time,
            track_id,
            reserved,
            duration,
            reserved2: r.array()?,
            layer: r.u16()?,
            alternate_group: r.u16()?,
            volume: r.u16()?,
            reserved3: r.u16()?,
            matrix: r.array()?,
            width: r.u32()?,
            height: r.u32()?,
        };
        r.finish()?;
        Ok(tkhd)
    }

    fn box_type(&self) -> FourCC {
        FourCC::TKHD
    }

    fn encode(&self, buf: &mut BytesMut) {
        let wide = self.wide();
        FullBoxHeader::new(u8::from(wide), self.header.flags).encode(buf);
        put_versioned(buf, wide, self.creation_time);
        put_versioned(buf, wide, self.modification_time);
        buf.put_u32(self.track_id);
        buf.put_u32(self.reserved);
        put_versioned(buf, wide, self.duration);
        buf.put_slice(&self.reserved2);
        buf.put_u16(self.layer);
        buf.put_u16(self.alternate_group);
        buf.put_u16(self.volume);
        buf.put_u16(self.reserved3);
        buf.put_slice(&self.matrix);
        buf.put_u32(self.width);
        buf.put_u32(self.height);
    }

    fn body_len(&self) -> u64 {
        if self.wide() {
            96
        } else {
            84
        }
    }
}

/// Media header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mdhd {
    pub header: FullBoxHeader,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    /// Packed ISO-639-2/T code.
    pub language: u16,
    pub pre_defined: u16,
}

impl Mdhd {
    /// `und`.
    pub const UNDETERMINED_LANGUAGE: u16 = 0x55c4;

    fn wide(&self) -> bool {
        needs_wide(
            &self.header,
            &[self.creation_time, self.modification_time, self.duration],
        )
    }
}

impl LeafBox for Mdhd {
    fn decode(box_type: FourCC, body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(box_type, body);
        let header = r.full_header()?;
        let creation_time = r.versioned(header.version)?;
        let modification_time = r.versioned(header.version)?;
        let timescale = r.u32()?;
        let duration = r.versioned(header.version)?;
        let mdhd = Self {
            header,
            creation_time,
            modification_time,
            timescale,
            duration,
            language: r.u16()?,
            pre_defined: r.u16()?,
        };
        r.finish()?;
        Ok(mdhd)
    }

    fn box_type(&self) -> FourCC {
        FourCC::MDHD
    }

    fn encode(&self, buf: &mut BytesMut) {
        let wide = self.wide();
        FullBoxHeader::new(u8::from(wide), self.header.flags).encode(buf);
        put_versioned(buf, wide, self.creation_time);
        put_versioned(buf, wide, self.modification_time);
        buf.put_u32(self.timescale);
        put_versioned(buf, wide, self.duration);
        buf.put_u16(self.language);
        buf.put_u16(self.pre_defined);
    }

    fn body_len(&self) -> u64 {
        if self.wide() {
            36
        } else {
            24
        }
    }
}

/// Handler reference. `handler_type` carries the media kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hdlr {
    pub header: FullBoxHeader,
    pub pre_defined: FourCC,
    pub handler_type: FourCC,
    pub reserved: [u8; 12],
    /// Name bytes as stored, terminator included when present.
    pub name: Bytes,
}

impl Hdlr {
    pub fn new(handler_type: FourCC, name: &str) -> Self {
        let mut stored = Vec::with_capacity(name.len() + 1);
        stored.extend_from_slice(name.as_bytes());
        stored.push(0);
        Self {
            header: FullBoxHeader::default(),
            pre_defined: FourCC([0; 4]),
            handler_type,
            reserved: [0; 12],
            name: Bytes::from(stored),
        }
    }

    /// Name without the terminator.
    pub fn name_lossy(&self) -> String {
        let end = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }
}

impl LeafBox for Hdlr {
    fn decode(box_type: FourCC, body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(box_type, body);
        Ok(Self {
            header: r.full_header()?,
            pre_defined: r.fourcc()?,
            handler_type: r.fourcc()?,
            reserved: r.array()?,
            name: r.rest(),
        })
    }

    fn box_type(&self) -> FourCC {
        FourCC::HDLR
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.header.encode(buf);
        buf.put_slice(&self.pre_defined.0);
        buf.put_slice(&self.handler_type.0);
        buf.put_slice(&self.reserved);
        buf.put_slice(&self.name);
    }

    fn body_len(&self) -> u64 {
        24 + self.name.len() as u64
    }
}

/// Video media header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vmhd {
    pub header: FullBoxHeader,
    pub graphics_mode: u16,
    pub opcolor: [u16; 3],
}

impl LeafBox for Vmhd {
    fn decode(box_type: FourCC, body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(box_type, body);
        let vmhd = Self {
            header: r.full_header()?,
            graphics_mode: r.u16()?,
            opcolor: [r.u16()?, r.u16()?, r.u16()?],
        };
        r.finish()?;
        Ok(vmhd)
    }

    fn box_type(&self) -> FourCC {
        FourCC::VMHD
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.header.encode(buf);
        buf.put_u16(self.graphics_mode);
        for c in self.opcolor {
            buf.put_u16(c);
        }
    }

    fn body_len(&self) -> u64 {
        12
    }
}

/// Sound media header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smhd {
    pub header: FullBoxHeader,
    /// 8.8 fixed point.
    pub balance: u16,
    pub reserved: u16,
}

impl LeafBox for Smhd {
    fn decode(box_type: FourCC, body: Bytes) -> Result<Self> {
        let mut r = BodyReader::new(box_type, body);
        let smhd = Self {
            header: r.full_header()?,
            balance: r.u16()?,
            reserved: r.u16()?,
        };
        r.finish()?;
        Ok(smhd)
    }

    fn box_type(&self) -> FourCC {
        FourCC::SMHD
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.header.encode(buf);
        buf.put_u16(self.balance);
        buf.put_u16(self.reserved);
    }

    fn body_len(&self) -> u64 {
        8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn reencode<T: LeafBox>(leaf: &T) -> Bytes {
        let mut buf = BytesMut::new();
        leaf.encode(&mut buf);
        assert_eq!(buf.len() as u64, leaf.body_len());
        buf.freeze()
    }

    fn mvhd_v0_body() -> Vec<u8> {
        let mut body = vec![0, 0, 0, 0];
        body.extend_from_slice(&10u32.to_be_bytes());
        body.extend_from_slice(&11u32.to_be_bytes());
        body.extend_from_slice(&600u32.to_be_bytes());
        body.extend_from_slice(&1200u32.to_be_bytes());
        body.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        body.extend_from_slice(&0x0100u16.to_be_bytes());
        body.extend_from_slice(&[0; 10]);
        body.extend_from_slice(&IDENTITY_MATRIX);
        body.extend_from_slice(&[0; 24]);
        body.extend_from_slice(&3u32.to_be_bytes());
        body
    }

    #[test]
    fn test_mvhd_v0_fields() {
        let body = Bytes::from(mvhd_v0_body());
        let mvhd = Mvhd::decode(FourCC::MVHD, body.clone()).unwrap();
        assert_eq!(mvhd.timescale, 600);
        assert_eq!(mvhd.duration, 1200);
        assert_eq!(mvhd.next_track_id, 3);
        assert_eq!(reencode(&mvhd), body);
    }

    #[test]
    fn test_mvhd_widens_when_duration_overflows() {
        let mut mvhd = Mvhd::decode(FourCC::MVHD, Bytes::from(mvhd_v0_body())).unwrap();
        mvhd.duration = u64::from(u32::MAX) + 1;
        let encoded = reencode(&mvhd);
        assert_eq!(encoded.len(), 112);
        assert_eq!(encoded[0], 1);
        let back = Mvhd::decode(FourCC::MVHD, encoded).unwrap();
        assert_eq!(back.duration, u64::from(u32::MAX) + 1);
    }

    #[test]
    fn test_mvhd_with_extra_bytes_rejected() {
        let mut body = mvhd_v0_body();
        body.push(0);
        assert_matches!(
            Mvhd::decode(FourCC::MVHD, Bytes::from(body)),
            Err(Error::InvalidMp4(_))
        );
    }

    #[test]
    fn test_hdlr_name_and_roundtrip() {
        let hdlr = Hdlr::new(FourCC(*b"tast"), "TTTV3");
        assert_eq!(hdlr.name_lossy(), "TTTV3");
        let encoded = reencode(&hdlr);
        let back = Hdlr::decode(FourCC::HDLR, encoded).unwrap();
        assert_eq!(back.handler_type, FourCC(*b"tast"));
        assert_eq!(back, hdlr);
    }

    #[test]
    fn test_ftyp_rejects_ragged_brand_list() {
        let body = Bytes::from_static(b"isom\0\0\0\x01mp4");
        assert!(Ftyp::decode(FourCC::FTYP, body).is_err());
    }

    #[test]
    fn test_ftyp_roundtrip() {
        let body = Bytes::from_static(b"isom\0\0\x02\0isommp41");
        let ftyp = Ftyp::decode(FourCC::FTYP, body.clone()).unwrap();
        assert_eq!(ftyp.compatible_brands.len(), 2);
        assert_eq!(reencode(&ftyp), body);
    }

    #[test]
    fn test_identity_matrix_layout() {
        assert_eq!(&IDENTITY_MATRIX[..4], &[0, 1, 0, 0]);
        assert_eq!(&IDENTITY_MATRIX[32..], &[0x40, 0, 0, 0]);
    }
}
