//! Composer session: owns the tree, rebuilds `mdat` in interleaved order and
//! ingests new tracks.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use chrono::Utc;
use flavmux_codec::{CodecRegistry, Frame};

use crate::boxes::{ChunkOffsets, FourCC, FullBoxHeader};
use crate::builder::{
    build_sample_table, chunk_samples, TrackBuilder, DEFAULT_CHUNK_SAMPLES, DEFAULT_SAMPLE_DELTA,
};
use crate::diagnostics::DiagnosticSink;
use crate::interleave::{interleave, select_criteria, Interleaved, TrackChunks};
use crate::sample_table::{decode_chunks, Chunk, DecodeMode, Sample};
use crate::track::{discover_tracks, MediaKind, TrackRef};
use crate::tree::BoxTree;
use crate::{Error, Result};

/// Handler name written into ingested tracks when none is configured.
pub const DEFAULT_HANDLER_NAME: &str = "TTTV3";

/// Composer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ComposeOptions {
    /// Criteria track preference, highest first.
    pub priority: Vec<MediaKind>,
    pub mode: DecodeMode,
    /// Samples per chunk for ingested tracks.
    pub chunk_samples: usize,
    /// Handler name for ingested tracks.
    pub handler_name: String,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            priority: MediaKind::ALL.to_vec(),
            mode: DecodeMode::Eager,
            chunk_samples: DEFAULT_CHUNK_SAMPLES,
            handler_name: DEFAULT_HANDLER_NAME.to_string(),
        }
    }
}

impl ComposeOptions {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_samples == 0 {
            return Err(Error::invalid_input("chunk_samples must be at least 1"));
        }
        Ok(())
    }
}

/// Outcome of one compose pass.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct ComposeReport {
    /// `None` when every participating track was empty.
    pub criteria: Option<MediaKind>,
    /// `(kind, chunk index)` in payload order.
    pub order: Vec<(MediaKind, usize)>,
    /// Absolute chunk offsets written per kind.
    pub offsets: BTreeMap<MediaKind, Vec<u64>>,
    pub payload_len: u64,
    pub mdat_offset: u64,
}

/// Per-track overview.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct TrackSummary {
    pub kind: MediaKind,
    pub index: usize,
    pub track_id: u32,
    pub timescale: u32,
    pub chunks: usize,
    pub samples: usize,
    pub bytes: u64,
    pub codecs: Vec<FourCC>,
}

/// Session over one file.
pub struct Composer {
    tree: BoxTree,
    options: ComposeOptions,
    sink: Arc<dyn DiagnosticSink>,
    tracks: BTreeMap<MediaKind, TrackRef>,
    chunks: BTreeMap<MediaKind, Vec<Chunk>>,
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("options", &self.options)
            .field("tracks", &self.tracks)
            .finish_non_exhaustive()
    }
}

impl Composer {
    /// Discover tracks and decode their chunks.
    pub fn new(tree: BoxTree, options: ComposeOptions, sink: Arc<dyn DiagnosticSink>) -> Result<Self> {
        tree.validate()?;
        options.validate()?;

        let mut tracks = BTreeMap::new();
        let mut chunks = BTreeMap::new();
        let mdat = tree.mdat()?;
        for track in discover_tracks(&tree, sink.as_ref())? {
            let view = track.view(&tree)?;
            let table = view.sample_table()?;
            if let Err(e) = table.check_consistency() {
                sink.warn(format!("{} track: {e}", track.kind));
            }
            let decoded = decode_chunks(&table, mdat, track.kind, options.mode)?;
            sink.debug(format!(
                "{} track: {} chunks, {} bytes",
                track.kind,
                decoded.len(),
                decoded.iter().map(Chunk::size).sum::<u64>()
            ));
            tracks.insert(track.kind, track);
            chunks.insert(track.kind, decoded);
        }

        Ok(Self {
            tree,
            options,
            sink,
            tracks,
            chunks,
        })
    }

    pub fn tree(&self) -> &BoxTree {
        &self.tree
    }

    pub fn into_tree(self) -> BoxTree {
        self.tree
    }

    pub fn options(&self) -> &ComposeOptions {
        &self.options
    }

    /// Kinds with a usable track, in priority order of [`MediaKind::ALL`].
    pub fn kinds(&self) -> Vec<MediaKind> {
        self.tracks.keys().copied().collect()
    }

    pub fn track(&self, kind: MediaKind) -> Option<TrackRef> {
        self.tracks.get(&kind).copied()
    }

    /// Cached chunks of a track; empty for an absent kind.
    pub fn chunks(&self, kind: MediaKind) -> &[Chunk] {
        self.chunks.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// One summary line per track.
    pub fn summary(&self) -> Result<Vec<TrackSummary>> {
        let mut out = Vec::with_capacity(self.tracks.len());
        for (kind, track) in &self.tracks {
            let view = track.view(&self.tree)?;
            let chunks = self.chunks(*kind);
            out.push(TrackSummary {
                kind: *kind,
                index: track.index,
                track_id: view.track_header().map_or(0, |t| t.track_id),
                timescale: view.media_header()?.timescale,
                chunks: chunks.len(),
                samples: chunks.iter().map(|c| c.samples.len()).sum(),
                bytes: chunks.iter().map(Chunk::size).sum(),
                codecs: view
                    .sample_table()?
                    .descriptions()
                    .map(|d| d.entries.iter().map(|e| e.format).collect())
                    .unwrap_or_default(),
            });
        }
        Ok(out)
    }

    /// Compose every discovered track.
    pub fn compose_all(&mut self) -> Result<ComposeReport> {
        let kinds = self.kinds();
        self.compose(&kinds)
    }

    /// Rebuild `mdat` from the chunks of `kinds` in interleaved order and
    /// rewrite their chunk offset tables.
    ///
    /// Tracks left out keep their old offsets, which no longer point at their
    /// data; each is reported.
    pub fn compose(&mut self, kinds: &[MediaKind]) -> Result<ComposeReport> {
        let mut selected: Vec<MediaKind> = Vec::new();
        for kind in kinds {
            if selected.contains(kind) {
                continue;
            }
            if self.tracks.contains_key(kind) {
                selected.push(*kind);
            } else {
                self.sink
                    .warn(format!("{kind} selected for compose but there is no such track"));
            }
        }
        for (kind, chunks) in &self.chunks {
            if !selected.contains(kind) && !chunks.is_empty() {
                self.sink.warn(format!(
                    "{kind} track left out of compose; its chunk offsets will be stale"
                ));
            }
        }

        let mut candidates = Vec::with_capacity(selected.len());
        for kind in &selected {
            let timescale = self.track_ref(*kind)?.view(&self.tree)?.timescale()?;
            candidates.push(TrackChunks {
                kind: *kind,
                timescale,
                chunks: self.chunks.get(kind).map(Vec::as_slice).unwrap_or_default(),
            });
        }

        let criteria = select_criteria(&self.options.priority, &candidates);
        let layout = match criteria {
            Some(criteria) => {
                let (lead, targets): (Vec<_>, Vec<_>) =
                    candidates.iter().copied().partition(|t| t.kind == criteria);
                match lead.first() {
                    Some(lead) => interleave(*lead, &targets),
                    None => Interleaved::default(),
                }
            }
            None => Interleaved::default(),
        };

        let source = self.tree.mdat()?.clone();
        let mut payload = BytesMut::with_capacity(layout.total_size as usize);
        for (kind, index) in &layout.order {
            let chunk = self
                .chunks
                .get(kind)
                .and_then(|c| c.get(*index))
                .ok_or_else(|| Error::inconsistent(format!("{kind} chunk {index} vanished")))?;
            for sample in &chunk.samples {
                payload.put_slice(&sample.resolve(&source)?);
            }
        }
        let payload = payload.freeze();
        let payload_len = payload.len() as u64;

        // Offset table sizes feed into the mdat position when moov comes
        // first, so settle the entry count and width before computing it.
        for kind in &selected {
            let count = layout.offsets.get(kind).map_or(0, Vec::len);
            self.track_ref(*kind)?
                .set_chunk_offsets(&mut self.tree, ChunkOffsets::placeholder(count))?;
        }
        self.tree.mdat_mut()?.payload = payload;

        let mut base = self.tree.mdat_data_offset()?;
        let large = base + payload_len > u64::from(u32::MAX);
        if large {
            for kind in &selected {
                let count = layout.offsets.get(kind).map_or(0, Vec::len);
                self.track_ref(*kind)?.set_chunk_offsets(
                    &mut self.tree,
                    ChunkOffsets {
                        header: FullBoxHeader::default(),
                        large: true,
                        offsets: vec![0; count],
                    },
                )?;
            }
            base = self.tree.mdat_data_offset()?;
            self.sink.info("chunk offsets exceed 32 bits, writing co64 tables");
        }

        let mut absolute = BTreeMap::new();
        for kind in &selected {
            let offsets: Vec<u64> = layout
                .offsets
                .get(kind)
                .map(|rel| rel.iter().map(|r| r + base).collect())
                .unwrap_or_default();
            self.track_ref(*kind)?.set_chunk_offsets(
                &mut self.tree,
                ChunkOffsets {
                    header: FullBoxHeader::default(),
                    large,
                    offsets: offsets.clone(),
                },
            )?;
            if !offsets.is_empty() {
                absolute.insert(*kind, offsets);
            }
        }
        self.tree.mdat_mut()?.data_offset = base;

        let mdat = self.tree.mdat()?;
        for kind in &selected {
            let track = self.track_ref(*kind)?;
            let table = track.view(&self.tree)?.sample_table()?;
            let refreshed = decode_chunks(&table, mdat, *kind, self.options.mode)?;
            self.chunks.insert(*kind, refreshed);
        }

        self.sink.info(format!(
            "composed {} chunks from {} tracks into {payload_len} bytes at offset {base}",
            layout.order.len(),
            selected.len()
        ));

        Ok(ComposeReport {
            criteria,
            order: layout.order,
            offsets: absolute,
            payload_len,
            mdat_offset: base,
        })
    }

    /// Encode `frames` with `codec` and append them as a new track.
    ///
    /// Encoding and validation happen before the tree is touched, so a
    /// rejected frame leaves it as it was. The new track's data is only placed
    /// into `mdat` by the next compose; until then its chunk offsets are
    /// placeholders. Existing tracks are relocated when the larger `moov`
    /// pushes `mdat` back.
    pub fn add_track(
        &mut self,
        kind: MediaKind,
        codec: &str,
        frames: &[Frame],
        fps: f64,
        registry: &CodecRegistry,
    ) -> Result<TrackRef> {
        if self.tracks.contains_key(&kind) {
            return Err(Error::TrackExists(kind));
        }
        if !(fps.is_finite() && fps > 0.0) {
            return Err(Error::invalid_input(format!("fps must be positive, got {fps}")));
        }
        let encoder = registry
            .get(codec)
            .ok_or_else(|| Error::UnknownCodec(codec.to_string()))?;
        let format: FourCC = codec.parse()?;

        let timescale = (fps * f64::from(DEFAULT_SAMPLE_DELTA)).round();
        if !(1.0..=f64::from(u32::MAX)).contains(&timescale) {
            return Err(Error::invalid_input(format!("fps {fps} gives no usable timescale")));
        }
        let timescale = timescale as u32;

        let payloads = frames
            .iter()
            .map(|frame| encoder.encode(frame))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let sample_count = payloads.len() as u64;

        let (movie_timescale, track_id) = {
            let mvhd = self.tree.movie_header()?;
            (mvhd.timescale, mvhd.next_track_id)
        };
        let track_duration = (sample_count as f64 / fps * f64::from(movie_timescale)).round() as u64;

        let chunks = chunk_samples(kind, payloads, DEFAULT_SAMPLE_DELTA, self.options.chunk_samples);
        let stbl = build_sample_table(&chunks, DEFAULT_SAMPLE_DELTA, format);
        let trak = TrackBuilder {
            kind,
            track_id,
            timescale,
            media_duration: sample_count * u64::from(DEFAULT_SAMPLE_DELTA),
            track_duration,
            handler_name: self.options.handler_name.clone(),
            creation_time: Utc::now(),
        }
        .build(stbl);

        let old_base = self.tree.mdat_data_offset()?;
        let mut tables = Vec::with_capacity(self.tracks.len());
        for track in self.tracks.values() {
            let offsets = track.view(&self.tree)?.sample_table()?.chunk_offsets()?;
            tables.push((*track, offsets.clone()));
        }

        let index = self.tree.append_track(trak)?;
        let mvhd = self.tree.movie_header_mut()?;
        mvhd.next_track_id = track_id.saturating_add(1);
        mvhd.duration = mvhd.duration.max(track_duration);
        self.relocate(&tables, old_base)?;

        self.sink.info(format!(
            "added {kind} track #{track_id}: {sample_count} samples in {} chunks, codec {codec}",
            chunks.len()
        ));
        let track = TrackRef { index, kind };
        self.tracks.insert(kind, track);
        self.chunks.insert(kind, chunks);
        Ok(track)
    }

    /// Decode every sample of a track back into frames.
    pub fn decode_frames(&self, kind: MediaKind, registry: &CodecRegistry) -> Result<Vec<Frame>> {
        let track = self.track_ref(kind)?;
        let descriptions = track.view(&self.tree)?.sample_table()?.descriptions()?;
        let mdat = self.tree.mdat()?;
        let mut frames = Vec::new();
        for chunk in self.chunks(kind) {
            let format = descriptions
                .entry(chunk.description_index)
                .map(|d| d.format)
                .ok_or_else(|| {
                    Error::inconsistent(format!(
                        "{kind} chunk refers to missing sample description {}",
                        chunk.description_index
                    ))
                })?;
            let codec = registry
                .get(format.as_str())
                .ok_or_else(|| Error::UnknownCodec(format.to_string()))?;
            for sample in &chunk.samples {
                frames.push(codec.decode(&sample.resolve(mdat)?)?);
            }
        }
        Ok(frames)
    }

    /// Shift the chunk offsets of `tables` by however far the `mdat` payload
    /// moved from `old_base`, widening a table to co64 when needed.
    fn relocate(&mut self, tables: &[(TrackRef, ChunkOffsets)], old_base: u64) -> Result<()> {
        loop {
            let base = self.tree.mdat_data_offset()?;
            if base == old_base {
                return Ok(());
            }
            let delta = base.checked_sub(old_base).ok_or_else(|| {
                Error::inconsistent(format!("mdat moved back from {old_base} to {base}"))
            })?;

            for (track, table) in tables {
                let offsets = table
                    .offsets
                    .iter()
                    .map(|o| {
                        o.checked_add(delta).ok_or_else(|| {
                            Error::inconsistent(format!("{} chunk offset {o} overflows", track.kind))
                        })
                    })
                    .collect::<Result<Vec<u64>>>()?;
                let large = table.large || offsets.iter().any(|o| *o > u64::from(u32::MAX));
                track.set_chunk_offsets(
                    &mut self.tree,
                    ChunkOffsets {
                        header: table.header,
                        large,
                        offsets,
                    },
                )?;
            }

            // A table widened to co64 grows moov again; go around once more.
            if self.tree.mdat_data_offset()? != base {
                continue;
            }
            self.tree.mdat_mut()?.data_offset = base;
            for chunk in self.chunks.values_mut().flatten() {
                for sample in &mut chunk.samples {
                    if let Sample::Ref { offset, .. } = sample {
                        *offset += delta;
                    }
                }
            }
            self.sink.debug(format!(
                "mdat moved from {old_base} to {base}; shifted chunk offsets of {} tracks",
                tables.len()
            ));
            return Ok(());
        }
    }

    fn track_ref(&self, kind: MediaKind) -> Result<TrackRef> {
        self.tracks.get(&kind).copied().ok_or(Error::NoSuchTrack(kind))
    }
}
