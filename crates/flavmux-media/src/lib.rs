//! ISO-BMFF (MP4) box tree handling and multi-track interleaving.
//!
//! This crate provides:
//! - A lossless box tree parser and writer
//! - Borrowed views over tracks and their sample tables
//! - Chunk decoding from sample tables
//! - Time-ordered interleaving of video, sound, taste and scent tracks
//! - Sample table and track construction for new media
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use flavmux_media::{BoxTree, ComposeOptions, Composer, TracingSink};
//!
//! let sink = Arc::new(TracingSink);
//! let tree = BoxTree::open("movie.mp4", sink.as_ref())?;
//! let mut composer = Composer::new(tree, ComposeOptions::default(), sink)?;
//! let report = composer.compose_all()?;
//! println!("payload is {} bytes", report.payload_len);
//! composer.tree().save("interleaved.mp4")?;
//! # Ok::<(), flavmux_media::Error>(())
//! ```

pub mod boxes;
pub mod builder;
pub mod composer;
pub mod diagnostics;
pub mod error;
pub mod interleave;
pub mod sample_table;
#[cfg(feature = "testing")]
pub mod testing;
pub mod track;
pub mod tree;

pub use boxes::{BoxBody, FourCC, Mp4Box, SizeField};
pub use composer::{ComposeOptions, ComposeReport, Composer, TrackSummary};
pub use diagnostics::{Diagnostic, DiagnosticSink, MemorySink, Severity, TracingSink};
pub use error::{Error, Result};
pub use interleave::{interleave, select_criteria, Interleaved, TrackChunks};
pub use sample_table::{decode_chunks, Chunk, DecodeMode, Sample};
pub use track::{discover_tracks, MediaKind, TrackRef, TrackView};
pub use tree::{BoxSummary, BoxTree};
