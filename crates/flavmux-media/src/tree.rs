//! Whole-file box tree: parse, query, write.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytes::{Buf, Bytes, BytesMut};

use crate::boxes::{BoxBody, FourCC, Mdat, Mp4Box, Mvhd, SizeField};
use crate::diagnostics::DiagnosticSink;
use crate::{Error, Result};

/// Nesting limit for container boxes.
const MAX_DEPTH: usize = 32;

/// Ordered top-level boxes of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxTree {
    boxes: Vec<Mp4Box>,
}

/// One line of [`BoxTree::summary`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct BoxSummary {
    pub depth: usize,
    pub box_type: FourCC,
    pub size: u64,
    pub offset: u64,
    pub kind: &'static str,
}

impl BoxTree {
    /// Parse a complete file image.
    ///
    /// Fails when a box overruns its parent, when a container's children do
    /// not tile its body, or when `mdat` or `moov.mvhd` is missing.
    pub fn parse(data: impl Into<Bytes>, sink: &dyn DiagnosticSink) -> Result<Self> {
        let data: Bytes = data.into();
        let boxes = parse_boxes(&data, 0, 0, sink)?;
        let tree = Self { boxes };
        tree.validate()?;
        sink.debug(format!(
            "parsed {} top-level boxes from {} bytes",
            tree.boxes.len(),
            data.len()
        ));
        Ok(tree)
    }

    /// Read and parse a file.
    pub fn open(path: impl AsRef<Path>, sink: &dyn DiagnosticSink) -> Result<Self> {
        let data = fs::read(path.as_ref())?;
        Self::parse(data, sink)
    }

    /// Wrap boxes without validation.
    pub fn from_boxes(boxes: Vec<Mp4Box>) -> Self {
        Self { boxes }
    }

    /// Check the boxes every operation depends on.
    pub fn validate(&self) -> Result<()> {
        self.mdat()?;
        self.movie_header()?;
        Ok(())
    }

    pub fn boxes(&self) -> &[Mp4Box] {
        &self.boxes
    }

    pub fn boxes_mut(&mut self) -> &mut Vec<Mp4Box> {
        &mut self.boxes
    }

    pub fn into_boxes(self) -> Vec<Mp4Box> {
        self.boxes
    }

    /// First top-level box of the given type.
    pub fn find(&self, box_type: FourCC) -> Option<&Mp4Box> {
        self.boxes.iter().find(|b| b.box_type == box_type)
    }

    pub fn find_mut(&mut self, box_type: FourCC) -> Option<&mut Mp4Box> {
        self.boxes.iter_mut().find(|b| b.box_type == box_type)
    }

    /// First match along a path starting at top level.
    pub fn find_path(&self, path: &[FourCC]) -> Option<&Mp4Box> {
        let (first, rest) = path.split_first()?;
        self.find(*first)?.path(rest)
    }

    pub fn find_path_mut(&mut self, path: &[FourCC]) -> Option<&mut Mp4Box> {
        let (first, rest) = path.split_first()?;
        self.find_mut(*first)?.path_mut(rest)
    }

    pub fn moov(&self) -> Result<&Mp4Box> {
        self.find(FourCC::MOOV).ok_or(Error::MissingBox("moov"))
    }

    pub fn moov_mut(&mut self) -> Result<&mut Mp4Box> {
        self.find_mut(FourCC::MOOV).ok_or(Error::MissingBox("moov"))
    }

    pub fn movie_header(&self) -> Result<&Mvhd> {
        self.moov()?
            .child(FourCC::MVHD)
            .ok_or(Error::MissingBox("moov.mvhd"))?
            .as_mvhd()
            .ok_or_else(|| Error::invalid_mp4("moov.mvhd could not be parsed"))
    }

    pub fn movie_header_mut(&mut self) -> Result<&mut Mvhd> {
        self.moov_mut()?
            .child_mut(FourCC::MVHD)
            .ok_or(Error::MissingBox("moov.mvhd"))?
            .as_mvhd_mut()
            .ok_or_else(|| Error::invalid_mp4("moov.mvhd could not be parsed"))
    }

    pub fn mdat(&self) -> Result<&Mdat> {
        self.find(FourCC::MDAT)
            .ok_or(Error::MissingBox("mdat"))?
            .as_mdat()
            .ok_or_else(|| Error::invalid_mp4("mdat is not a media data box"))
    }

    pub fn mdat_mut(&mut self) -> Result<&mut Mdat> {
        self.find_mut(FourCC::MDAT)
            .ok_or(Error::MissingBox("mdat"))?
            .as_mdat_mut()
            .ok_or_else(|| Error::invalid_mp4("mdat is not a media data box"))
    }

    /// Absolute offset the first `mdat` payload byte will have when the tree
    /// is written as it stands now.
    pub fn mdat_data_offset(&self) -> Result<u64> {
        let mut offset = 0u64;
        for b in &self.boxes {
            if b.box_type == FourCC::MDAT {
                return Ok(offset + b.header_len());
            }
            offset += b.encoded_size();
        }
        Err(Error::MissingBox("mdat"))
    }

    /// Append a `trak` under `moov`, returning its index among moov's
    /// children.
    pub fn append_track(&mut self, trak: Mp4Box) -> Result<usize> {
        let children = self
            .moov_mut()?
            .children_mut()
            .ok_or_else(|| Error::invalid_mp4("moov is not a container"))?;
        children.push(trak);
        Ok(children.len() - 1)
    }

    pub fn encoded_size(&self) -> u64 {
        self.boxes.iter().map(Mp4Box::encoded_size).sum()
    }

    /// Serialize the whole tree.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_size() as usize);
        for b in &self.boxes {
            b.encode(&mut buf);
        }
        buf.freeze()
    }

    /// Stream the tree out, writing `mdat` payloads without an extra copy.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        for b in &self.boxes {
            let mut buf = BytesMut::new();
            match &b.body {
                BoxBody::Mdat(mdat) => {
                    b.encode_header(&mut buf);
                    writer.write_all(&buf)?;
                    writer.write_all(&mdat.payload)?;
                }
                _ => {
                    b.encode(&mut buf);
                    writer.write_all(&buf)?;
                }
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Write to a file, replacing it.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = fs::File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)
    }

    /// Depth-first listing with absolute offsets.
    pub fn summary(&self) -> Vec<BoxSummary> {
        let mut out = Vec::new();
        summarize(&self.boxes, 0, 0, &mut out);
        out
    }
}

fn summarize(boxes: &[Mp4Box], depth: usize, mut offset: u64, out: &mut Vec<BoxSummary>) {
    for b in boxes {
        let size = b.encoded_size();
        out.push(BoxSummary {
            depth,
            box_type: b.box_type,
            size,
            offset,
            kind: b.body.kind_label(),
        });
        if let Some(children) = b.children() {
            summarize(children, depth + 1, offset + b.header_len(), out);
        }
        offset += size;
    }
}

/// Parse a sequence of sibling boxes that must exactly tile `data`.
/// `base` is the absolute file offset of `data[0]`.
fn parse_boxes(
    data: &Bytes,
    base: u64,
    depth: usize,
    sink: &dyn DiagnosticSink,
) -> Result<Vec<Mp4Box>> {
    if depth > MAX_DEPTH {
        return Err(Error::invalid_mp4(format!(
            "boxes nested deeper than {MAX_DEPTH} levels"
        )));
    }

    let mut boxes = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        let mut header = &data[pos..];
        let available = header.len();
        if available < 8 {
            return Err(Error::invalid_mp4(format!(
                "{available} stray bytes at offset {} where a box header was expected",
                base + pos as u64
            )));
        }
        let size32 = header.get_u32();
        let box_type = FourCC([header[0], header[1], header[2], header[3]]);
        header.advance(4);

        let (size_field, header_len, size) = match size32 {
            1 => {
                if header.len() < 8 {
                    return Err(Error::Truncated {
                        box_type,
                        need: 16,
                        have: available,
                    });
                }
                (SizeField::Large, 16u64, header.get_u64())
            }
            0 if depth == 0 => (SizeField::UntilEof, 8u64, available as u64),
            0 => {
                return Err(Error::invalid_mp4(format!(
                    "{box_type}: size 0 is only valid at top level"
                )))
            }
            n => (SizeField::Compact, 8u64, u64::from(n)),
        };

        if size < header_len {
            return Err(Error::invalid_mp4(format!(
                "{box_type}: size {size} smaller than its {header_len}-byte header"
            )));
        }
        if size > available as u64 {
            return Err(Error::BoxSizeMismatch {
                box_type,
                declared: size,
                available: available as u64,
            });
        }

        let body_start = pos + header_len as usize;
        let end = pos + size as usize;
        let body = data.slice(body_start..end);
        let body_offset = base + body_start as u64;

        let body = if box_type.is_container() {
            BoxBody::Container(parse_boxes(&body, body_offset, depth + 1, sink)?)
        } else if box_type == FourCC::MDAT {
            BoxBody::Mdat(Mdat {
                payload: body,
                data_offset: body_offset,
            })
        } else {
            BoxBody::decode_leaf(box_type, body, sink)
        };

        boxes.push(Mp4Box {
            box_type,
            size_field,
            body,
        });
        pos = end;
    }
    Ok(boxes)
}
