//! ISO-BMFF box model.
//!
//! A file is a sequence of boxes. Each box is a container (children only), a
//! typed leaf, or an opaque run of bytes. Unknown boxes are kept verbatim so
//! that parse followed by write reproduces the input exactly.

mod movie;
mod reader;
mod sample;

pub use movie::{Ftyp, Hdlr, Mdat, Mdhd, Mvhd, Smhd, Tkhd, Vmhd, IDENTITY_MATRIX};
pub use sample::{
    ChunkOffsets, SampleDescription, SampleSizes, Stsc, StscEntry, Stsd, Stsz, Stts, SttsEntry,
};

pub(crate) use reader::BodyReader;

use bytes::{BufMut, Bytes, BytesMut};

use crate::diagnostics::DiagnosticSink;
use crate::Result;

/// Four-character box type code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub const FTYP: Self = Self(*b"ftyp");
    pub const MOOV: Self = Self(*b"moov");
    pub const MDAT: Self = Self(*b"mdat");
    pub const MVHD: Self = Self(*b"mvhd");
    pub const TRAK: Self = Self(*b"trak");
    pub const TKHD: Self = Self(*b"tkhd");
    pub const EDTS: Self = Self(*b"edts");
    pub const ELST: Self = Self(*b"elst");
    pub const MDIA: Self = Self(*b"mdia");
    pub const MDHD: Self = Self(*b"mdhd");
    pub const HDLR: Self = Self(*b"hdlr");
    pub const MINF: Self = Self(*b"minf");
    pub const VMHD: Self = Self(*b"vmhd");
    pub const SMHD: Self = Self(*b"smhd");
    pub const NMHD: Self = Self(*b"nmhd");
    pub const DINF: Self = Self(*b"dinf");
    pub const DREF: Self = Self(*b"dref");
    pub const URL: Self = Self(*b"url ");
    pub const STBL: Self = Self(*b"stbl");
    pub const STSD: Self = Self(*b"stsd");
    pub const STTS: Self = Self(*b"stts");
    pub const STSC: Self = Self(*b"stsc");
    pub const STSZ: Self = Self(*b"stsz");
    pub const STCO: Self = Self(*b"stco");
    pub const CO64: Self = Self(*b"co64");
    pub const UDTA: Self = Self(*b"udta");
    pub const MVEX: Self = Self(*b"mvex");
    pub const FREE: Self = Self(*b"free");

    /// Box types whose body is nothing but child boxes.
    pub const CONTAINERS: [Self; 9] = [
        Self::MOOV,
        Self::TRAK,
        Self::EDTS,
        Self::MDIA,
        Self::MINF,
        Self::DINF,
        Self::STBL,
        Self::UDTA,
        Self::MVEX,
    ];

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }

    pub fn is_container(&self) -> bool {
        Self::CONTAINERS.contains(self)
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::fmt::Debug for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FourCC({:?})", self.as_str())
    }
}

impl std::str::FromStr for FourCC {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| crate::Error::InvalidFourCC(s.to_string()))?;
        Ok(Self(bytes))
    }
}

#[cfg(feature = "serialize")]
impl serde::Serialize for FourCC {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Version and flags of a full box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FullBoxHeader {
    pub version: u8,
    /// Lower 24 bits only.
    pub flags: u32,
}

impl FullBoxHeader {
    pub const fn new(version: u8, flags: u32) -> Self {
        Self { version, flags }
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_uint(u64::from(self.flags & 0x00ff_ffff), 3);
    }
}

/// How a box header encodes its size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SizeField {
    /// 32-bit size.
    #[default]
    Compact,
    /// `size == 1` followed by a 64-bit size.
    Large,
    /// `size == 0`: the box extends to the end of the file.
    UntilEof,
}

impl SizeField {
    /// The form actually written for a body of `body_len` bytes. A compact
    /// header that can no longer hold the size is widened.
    pub fn effective(self, body_len: u64) -> Self {
        match self {
            SizeField::Compact if body_len + 8 > u64::from(u32::MAX) => SizeField::Large,
            other => other,
        }
    }

    pub fn header_len(self, body_len: u64) -> u64 {
        match self.effective(body_len) {
            SizeField::Large => 16,
            _ => 8,
        }
    }
}

/// Capability shared by every typed leaf: decode from a body, encode back,
/// and report the encoded body length.
pub trait LeafBox: Sized {
    fn decode(box_type: FourCC, body: Bytes) -> Result<Self>;

    fn box_type(&self) -> FourCC;

    fn encode(&self, buf: &mut BytesMut);

    fn body_len(&self) -> u64;
}

/// Body of a box.
#[derive(Debug, Clone, PartialEq)]
pub enum BoxBody {
    Container(Vec<Mp4Box>),
    Ftyp(Ftyp),
    Mdat(Mdat),
    Mvhd(Mvhd),
    Tkhd(Tkhd),
    Mdhd(Mdhd),
    Hdlr(Hdlr),
    Vmhd(Vmhd),
    Smhd(Smhd),
    Stsd(Stsd),
    Stts(Stts),
    Stsc(Stsc),
    Stsz(Stsz),
    /// `stco` or `co64`, told apart by [`ChunkOffsets::large`].
    ChunkOffsets(ChunkOffsets),
    /// Unknown box, or a known leaf that failed to decode.
    Raw(Bytes),
}

type LeafDecoder = fn(FourCC, Bytes) -> Result<BoxBody>;

fn decode_as<T: LeafBox>(box_type: FourCC, body: Bytes) -> Result<BoxBody>
where
    BoxBody: From<T>,
{
    T::decode(box_type, body).map(BoxBody::from)
}

/// Typed leaves by box type. `mdat` is absent: its decoding needs the file
/// position and is handled by the tree parser.
static LEAF_DECODERS: &[(FourCC, LeafDecoder)] = &[
    (FourCC::FTYP, decode_as::<Ftyp>),
    (FourCC::MVHD, decode_as::<Mvhd>),
    (FourCC::TKHD, decode_as::<Tkhd>),
    (FourCC::MDHD, decode_as::<Mdhd>),
    (FourCC::HDLR, decode_as::<Hdlr>),
    (FourCC::VMHD, decode_as::<Vmhd>),
    (FourCC::SMHD, decode_as::<Smhd>),
    (FourCC::STSD, decode_as::<Stsd>),
    (FourCC::STTS, decode_as::<Stts>),
    (FourCC::STSC, decode_as::<Stsc>),
    (FourCC::STSZ, decode_as::<Stsz>),
    (FourCC::STCO, decode_as::<ChunkOffsets>),
    (FourCC::CO64, decode_as::<ChunkOffsets>),
];

impl BoxBody {
    /// Decode a leaf body. Unknown types stay raw; a known type that fails to
    /// decode also stays raw and is reported as a warning.
    pub fn decode_leaf(box_type: FourCC, body: Bytes, sink: &dyn DiagnosticSink) -> Self {
        let Some((_, decode)) = LEAF_DECODERS.iter().find(|(t, _)| *t == box_type) else {
            return BoxBody::Raw(body);
        };
        match decode(box_type, body.clone()) {
            Ok(decoded) => decoded,
            Err(e) => {
                sink.warn(format!("{box_type}: {e}; keeping raw bytes"));
                BoxBody::Raw(body)
            }
        }
    }

    pub fn body_len(&self) -> u64 {
        match self {
            BoxBody::Container(children) => children.iter().map(Mp4Box::encoded_size).sum(),
            BoxBody::Ftyp(b) => b.body_len(),
            BoxBody::Mdat(b) => b.body_len(),
            BoxBody::Mvhd(b) => b.body_len(),
            BoxBody::Tkhd(b) => b.body_len(),
            BoxBody::Mdhd(b) => b.body_len(),
            BoxBody::Hdlr(b) => b.body_len(),
            BoxBody::Vmhd(b) => b.body_len(),
            BoxBody::Smhd(b) => b.body_len(),
            BoxBody::Stsd(b) => b.body_len(),
            BoxBody::Stts(b) => b.body_len(),
            BoxBody::Stsc(b) => b.body_len(),
            BoxBody::Stsz(b) => b.body_len(),
            BoxBody::ChunkOffsets(b) => b.body_len(),
            BoxBody::Raw(b) => b.len() as u64,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            BoxBody::Container(children) => {
                for child in children {
                    child.encode(buf);
                }
            }
            BoxBody::Ftyp(b) => b.encode(buf),
            BoxBody::Mdat(b) => b.encode(buf),
            BoxBody::Mvhd(b) => b.encode(buf),
            BoxBody::Tkhd(b) => b.encode(buf),
            BoxBody::Mdhd(b) => b.encode(buf),
            BoxBody::Hdlr(b) => b.encode(buf),
            BoxBody::Vmhd(b) => b.encode(buf),
            BoxBody::Smhd(b) => b.encode(buf),
            BoxBody::Stsd(b) => b.encode(buf),
            BoxBody::Stts(b) => b.encode(buf),
            BoxBody::Stsc(b) => b.encode(buf),
            BoxBody::Stsz(b) => b.encode(buf),
            BoxBody::ChunkOffsets(b) => b.encode(buf),
            BoxBody::Raw(b) => buf.put_slice(b),
        }
    }

    /// Short label for summaries.
    pub fn kind_label(&self) -> &'static str {
        match self {
            BoxBody::Container(_) => "container",
            BoxBody::Raw(_) => "raw",
            _ => "typed",
        }
    }
}

/// One box: type, header size form, body.
#[derive(Debug, Clone, PartialEq)]
pub struct Mp4Box {
    pub box_type: FourCC,
    pub size_field: SizeField,
    pub body: BoxBody,
}

macro_rules! typed_accessors {
    ($($variant:ident => $get:ident, $get_mut:ident;)*) => {
        $(
            pub fn $get(&self) -> Option<&$variant> {
                match &self.body {
                    BoxBody::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            pub fn $get_mut(&mut self) -> Option<&mut $variant> {
                match &mut self.body {
                    BoxBody::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        )*
    };
}

impl Mp4Box {
    /// Container box with a compact header.
    pub fn container(box_type: FourCC, children: Vec<Mp4Box>) -> Self {
        Self {
            box_type,
            size_field: SizeField::Compact,
            body: BoxBody::Container(children),
        }
    }

    /// Opaque box with a compact header.
    pub fn raw(box_type: FourCC, body: impl Into<Bytes>) -> Self {
        Self {
            box_type,
            size_field: SizeField::Compact,
            body: BoxBody::Raw(body.into()),
        }
    }

    /// Typed leaf with a compact header.
    pub fn leaf<T: LeafBox>(leaf: T) -> Self
    where
        BoxBody: From<T>,
    {
        Self {
            box_type: leaf.box_type(),
            size_field: SizeField::Compact,
            body: BoxBody::from(leaf),
        }
    }

    /// Header length as it will be written.
    pub fn header_len(&self) -> u64 {
        self.size_field.header_len(self.body.body_len())
    }

    /// Total encoded size, header included.
    pub fn encoded_size(&self) -> u64 {
        let body_len = self.body.body_len();
        self.size_field.header_len(body_len) + body_len
    }

    /// Write the header only.
    pub fn encode_header(&self, buf: &mut BytesMut) {
        let body_len = self.body.body_len();
        match self.size_field.effective(body_len) {
            SizeField::Compact => {
                buf.put_u32((body_len + 8) as u32);
                buf.put_slice(&self.box_type.0);
            }
            SizeField::Large => {
                buf.put_u32(1);
                buf.put_slice(&self.box_type.0);
                buf.put_u64(body_len + 16);
            }
            SizeField::UntilEof => {
                buf.put_u32(0);
                buf.put_slice(&self.box_type.0);
            }
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        self.encode_header(buf);
        self.body.encode(buf);
    }

    pub fn children(&self) -> Option<&[Mp4Box]> {
        match &self.body {
            BoxBody::Container(children) => Some(children),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Mp4Box>> {
        match &mut self.body {
            BoxBody::Container(children) => Some(children),
            _ => None,
        }
    }

    /// First direct child of the given type.
    pub fn child(&self, box_type: FourCC) -> Option<&Mp4Box> {
        self.children()?.iter().find(|b| b.box_type == box_type)
    }

    pub fn child_mut(&mut self, box_type: FourCC) -> Option<&mut Mp4Box> {
        self.children_mut()?.iter_mut().find(|b| b.box_type == box_type)
    }

    /// Follow a chain of first-matching children.
    pub fn path(&self, path: &[FourCC]) -> Option<&Mp4Box> {
        path.iter().try_fold(self, |node, t| node.child(*t))
    }

    pub fn path_mut(&mut self, path: &[FourCC]) -> Option<&mut Mp4Box> {
        let mut node = self;
        for t in path {
            node = node.child_mut(*t)?;
        }
        Some(node)
    }

    typed_accessors! {
        Ftyp => as_ftyp, as_ftyp_mut;
        Mdat => as_mdat, as_mdat_mut;
        Mvhd => as_mvhd, as_mvhd_mut;
        Tkhd => as_tkhd, as_tkhd_mut;
        Mdhd => as_mdhd, as_mdhd_mut;
        Hdlr => as_hdlr, as_hdlr_mut;
        Vmhd => as_vmhd, as_vmhd_mut;
        Smhd => as_smhd, as_smhd_mut;
        Stsd => as_stsd, as_stsd_mut;
        Stts => as_stts, as_stts_mut;
        Stsc => as_stsc, as_stsc_mut;
        Stsz => as_stsz, as_stsz_mut;
        ChunkOffsets => as_chunk_offsets, as_chunk_offsets_mut;
    }
}

macro_rules! leaf_into_body {
    ($($variant:ident),*) => {
        $(
            impl From<$variant> for BoxBody {
                fn from(leaf: $variant) -> Self {
                    BoxBody::$variant(leaf)
                }
            }
        )*
    };
}

leaf_into_body!(Ftyp, Mdat, Mvhd, Tkhd, Mdhd, Hdlr, Vmhd, Smhd, Stsd, Stts, Stsc, Stsz, ChunkOffsets);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{MemorySink, Severity};

    #[test]
    fn test_fourcc_parse_and_display() {
        let t: FourCC = "tast".parse().unwrap();
        assert_eq!(t, FourCC(*b"tast"));
        assert_eq!(t.to_string(), "tast");
        assert!("toolong".parse::<FourCC>().is_err());
        assert!(FourCC::STBL.is_container());
        assert!(!FourCC::STSD.is_container());
    }

    #[test]
    fn test_size_field_widens_when_needed() {
        assert_eq!(SizeField::Compact.header_len(100), 8);
        assert_eq!(SizeField::Large.header_len(100), 16);
        assert_eq!(SizeField::UntilEof.header_len(100), 8);
        assert_eq!(
            SizeField::Compact.effective(u64::from(u32::MAX)),
            SizeField::Large
        );
    }

    #[test]
    fn test_encode_large_header() {
        let b = Mp4Box {
            box_type: FourCC::FREE,
            size_field: SizeField::Large,
            body: BoxBody::Raw(Bytes::from_static(b"abc")),
        };
        let mut buf = BytesMut::new();
        b.encode(&mut buf);
        assert_eq!(b.encoded_size(), 19);
        assert_eq!(&buf[..4], &[0, 0, 0, 1]);
        assert_eq!(&buf[4..8], b"free");
        assert_eq!(&buf[8..16], &19u64.to_be_bytes());
        assert_eq!(&buf[16..], b"abc");
    }

    #[test]
    fn test_unparsable_known_leaf_stays_raw() {
        let sink = MemorySink::new();
        let body = Bytes::from_static(&[0, 0]);
        let decoded = BoxBody::decode_leaf(FourCC::HDLR, body.clone(), &sink);
        assert_eq!(decoded, BoxBody::Raw(body));
        assert!(sink.contains(Severity::Warning, "hdlr"));
    }

    #[test]
    fn test_unknown_leaf_stays_raw_silently() {
        let sink = MemorySink::new();
        let body = Bytes::from_static(b"anything");
        let decoded = BoxBody::decode_leaf(FourCC(*b"uuid"), body.clone(), &sink);
        assert_eq!(decoded, BoxBody::Raw(body));
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_path_lookup_takes_first_match() {
        let first = Mp4Box::raw(FourCC::FREE, Bytes::from_static(b"1"));
        let second = Mp4Box::raw(FourCC::FREE, Bytes::from_static(b"2"));
        let minf = Mp4Box::container(FourCC::MINF, vec![first.clone(), second]);
        let mdia = Mp4Box::container(FourCC::MDIA, vec![minf]);
        assert_eq!(mdia.path(&[FourCC::MINF, FourCC::FREE]), Some(&first));
        assert!(mdia.path(&[FourCC::STBL]).is_none());
    }
}
