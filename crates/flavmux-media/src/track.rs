//! Track discovery and borrowed views over track boxes.

use std::fmt;
use std::str::FromStr;

use crate::boxes::{ChunkOffsets, FourCC, Hdlr, Mdhd, Mp4Box, Stsc, Stsd, Stsz, Stts, Tkhd};
use crate::diagnostics::DiagnosticSink;
use crate::tree::BoxTree;
use crate::{Error, Result};

const STBL_PATH: [FourCC; 3] = [FourCC::MDIA, FourCC::MINF, FourCC::STBL];

/// Media kind, identified by the handler type of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "lowercase"))]
pub enum MediaKind {
    Video,
    Sound,
    Taste,
    Scent,
}

impl MediaKind {
    /// Default interleaving priority.
    pub const ALL: [MediaKind; 4] = [
        MediaKind::Video,
        MediaKind::Sound,
        MediaKind::Taste,
        MediaKind::Scent,
    ];

    /// Handler type code.
    pub fn handler_type(self) -> FourCC {
        match self {
            MediaKind::Video => FourCC(*b"vide"),
            MediaKind::Sound => FourCC(*b"soun"),
            MediaKind::Taste => FourCC(*b"tast"),
            MediaKind::Scent => FourCC(*b"scnt"),
        }
    }

    pub fn from_handler_type(code: FourCC) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.handler_type() == code)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.handler_type().as_str())
    }
}

impl FromStr for MediaKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vide" | "video" => Ok(MediaKind::Video),
            "soun" | "sound" | "audio" => Ok(MediaKind::Sound),
            "tast" | "taste" => Ok(MediaKind::Taste),
            "scnt" | "scent" => Ok(MediaKind::Scent),
            _ => Err(Error::invalid_input(format!("unknown media kind: {s}"))),
        }
    }
}

/// Handle on a track: its position among `moov`'s children and its kind.
///
/// Indices stay valid as long as nothing is removed from `moov`; tracks are
/// only ever appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackRef {
    pub index: usize,
    pub kind: MediaKind,
}

impl TrackRef {
    fn trak<'a>(&self, tree: &'a BoxTree) -> Result<&'a Mp4Box> {
        tree.moov()?
            .children()
            .and_then(|c| c.get(self.index))
            .filter(|b| b.box_type == FourCC::TRAK)
            .ok_or_else(|| Error::invalid_mp4(format!("{} track box vanished", self.kind)))
    }

    fn trak_mut<'a>(&self, tree: &'a mut BoxTree) -> Result<&'a mut Mp4Box> {
        tree.moov_mut()?
            .children_mut()
            .and_then(|c| c.get_mut(self.index))
            .filter(|b| b.box_type == FourCC::TRAK)
            .ok_or_else(|| Error::invalid_mp4(format!("{} track box vanished", self.kind)))
    }

    pub fn view<'a>(&self, tree: &'a BoxTree) -> Result<TrackView<'a>> {
        Ok(TrackView {
            kind: self.kind,
            trak: self.trak(tree)?,
        })
    }

    /// Replace the chunk offset table, retagging the box as `stco` or `co64`
    /// to match the table's width.
    pub fn set_chunk_offsets(&self, tree: &mut BoxTree, offsets: ChunkOffsets) -> Result<()> {
        let stbl = self
            .trak_mut(tree)?
            .path_mut(&STBL_PATH)
            .ok_or(Error::MissingBox("trak.mdia.minf.stbl"))?;
        let slot = stbl
            .children_mut()
            .and_then(|c| {
                c.iter_mut()
                    .find(|b| b.box_type == FourCC::STCO || b.box_type == FourCC::CO64)
            })
            .ok_or(Error::MissingBox("stbl.stco"))?;
        *slot = Mp4Box::leaf(offsets);
        Ok(())
    }
}

/// Borrowed view over one `trak`.
#[derive(Debug, Clone, Copy)]
pub struct TrackView<'a> {
    kind: MediaKind,
    trak: &'a Mp4Box,
}

impl<'a> TrackView<'a> {
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn track_header(&self) -> Result<&'a Tkhd> {
        self.trak
            .child(FourCC::TKHD)
            .and_then(Mp4Box::as_tkhd)
            .ok_or(Error::MissingBox("trak.tkhd"))
    }

    pub fn media_header(&self) -> Result<&'a Mdhd> {
        self.trak
            .path(&[FourCC::MDIA, FourCC::MDHD])
            .and_then(Mp4Box::as_mdhd)
            .ok_or(Error::MissingBox("trak.mdia.mdhd"))
    }

    pub fn handler(&self) -> Result<&'a Hdlr> {
        self.trak
            .path(&[FourCC::MDIA, FourCC::HDLR])
            .and_then(Mp4Box::as_hdlr)
            .ok_or(Error::MissingBox("trak.mdia.hdlr"))
    }

    /// Media timescale (ticks per second).
    pub fn timescale(&self) -> Result<u32> {
        let timescale = self.media_header()?.timescale;
        if timescale == 0 {
            return Err(Error::inconsistent(format!("{} track has timescale 0", self.kind)));
        }
        Ok(timescale)
    }

    pub fn sample_table(&self) -> Result<SampleTableView<'a>> {
        self.trak
            .path(&STBL_PATH)
            .map(|stbl| SampleTableView { stbl })
            .ok_or(Error::MissingBox("trak.mdia.minf.stbl"))
    }
}

/// Borrowed view over one `stbl`.
#[derive(Debug, Clone, Copy)]
pub struct SampleTableView<'a> {
    stbl: &'a Mp4Box,
}

impl<'a> SampleTableView<'a> {
    pub fn descriptions(&self) -> Result<&'a Stsd> {
        self.stbl
            .child(FourCC::STSD)
            .and_then(Mp4Box::as_stsd)
            .ok_or(Error::MissingBox("stbl.stsd"))
    }

    pub fn time_to_sample(&self) -> Result<&'a Stts> {
        self.stbl
            .child(FourCC::STTS)
            .and_then(Mp4Box::as_stts)
            .ok_or(Error::MissingBox("stbl.stts"))
    }

    pub fn sample_to_chunk(&self) -> Result<&'a Stsc> {
        self.stbl
            .child(FourCC::STSC)
            .and_then(Mp4Box::as_stsc)
            .ok_or(Error::MissingBox("stbl.stsc"))
    }

    pub fn sample_sizes(&self) -> Result<&'a Stsz> {
        self.stbl
            .child(FourCC::STSZ)
            .and_then(Mp4Box::as_stsz)
            .ok_or(Error::MissingBox("stbl.stsz"))
    }

    /// `stco` or `co64`, whichever comes first.
    pub fn chunk_offsets(&self) -> Result<&'a ChunkOffsets> {
        self.stbl
            .children()
            .and_then(|c| c.iter().find_map(Mp4Box::as_chunk_offsets))
            .ok_or(Error::MissingBox("stbl.stco"))
    }

    /// Number of samples the sample-to-chunk runs imply over all chunks.
    pub fn samples_by_chunks(&self) -> Result<u64> {
        let runs = &self.sample_to_chunk()?.entries;
        let chunk_count = self.chunk_offsets()?.offsets.len() as u64;
        let mut total = 0u64;
        for (i, run) in runs.iter().enumerate() {
            let first = u64::from(run.first_chunk);
            let end = runs
                .get(i + 1)
                .map_or(chunk_count + 1, |next| u64::from(next.first_chunk));
            total += end.saturating_sub(first) * u64::from(run.samples_per_chunk);
        }
        Ok(total)
    }

    /// Check that time, size and chunk tables describe the same samples.
    pub fn check_consistency(&self) -> Result<u64> {
        let by_time = self.time_to_sample()?.sample_count();
        let by_size = self.sample_sizes()?.sizes.count();
        let by_chunks = self.samples_by_chunks()?;
        if by_time != by_size || by_size != by_chunks {
            return Err(Error::inconsistent(format!(
                "stts covers {by_time} samples, stsz {by_size}, stsc/stco {by_chunks}"
            )));
        }
        Ok(by_size)
    }
}

/// Find tracks whose handler names a supported media kind.
///
/// A track with a missing or unparsable handler is reported and ignored. For
/// a duplicated kind the first track wins.
pub fn discover_tracks(tree: &BoxTree, sink: &dyn DiagnosticSink) -> Result<Vec<TrackRef>> {
    let moov = tree.moov()?;
    let mut found: Vec<TrackRef> = Vec::new();
    for (index, child) in moov.children().unwrap_or_default().iter().enumerate() {
        if child.box_type != FourCC::TRAK {
            continue;
        }
        let Some(handler) = child
            .path(&[FourCC::MDIA, FourCC::HDLR])
            .and_then(Mp4Box::as_hdlr)
        else {
            sink.error(format!(
                "track at moov[{index}]: handler missing or unparsable, track ignored"
            ));
            continue;
        };
        let Some(kind) = MediaKind::from_handler_type(handler.handler_type) else {
            sink.warn(format!(
                "track at moov[{index}]: unsupported handler {}",
                handler.handler_type
            ));
            continue;
        };
        if found.iter().any(|t| t.kind == kind) {
            sink.warn(format!(
                "track at moov[{index}]: duplicate {kind} track ignored"
            ));
            continue;
        }
        sink.debug(format!("found {kind} track at moov[{index}]"));
        found.push(TrackRef { index, kind });
    }
    Ok(found)
}
