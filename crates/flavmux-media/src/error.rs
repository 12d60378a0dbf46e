//! Error types for flavmux-media.

use std::io;
use thiserror::Error;

use crate::boxes::FourCC;
use crate::track::MediaKind;
use flavmux_codec::CodecError;

/// Result type for flavmux-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for flavmux-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid MP4 file structure.
    #[error("Invalid MP4: {0}")]
    InvalidMp4(String),

    /// Missing required box.
    #[error("Missing required box: {0}")]
    MissingBox(&'static str),

    /// A box declares more bytes than its parent (or the file) has left.
    #[error("Box {box_type} declares {declared} bytes but only {available} remain")]
    BoxSizeMismatch {
        box_type: FourCC,
        declared: u64,
        available: u64,
    },

    /// A box body ended before all of its fields were read.
    #[error("Box {box_type} truncated: need {need} bytes, have {have}")]
    Truncated {
        box_type: FourCC,
        need: usize,
        have: usize,
    },

    /// Not a four-character code.
    #[error("Invalid four-character code: {0:?}")]
    InvalidFourCC(String),

    /// Sample tables disagree with each other or with the payload.
    #[error("Inconsistent sample table: {0}")]
    InconsistentTable(String),

    /// A track of this media kind is already present.
    #[error("A {0} track already exists")]
    TrackExists(MediaKind),

    /// No track of this media kind is present.
    #[error("No {0} track")]
    NoSuchTrack(MediaKind),

    /// Codec name not found in the registry.
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),

    /// Codec rejected a frame or a sample.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Caller-supplied parameter out of range.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create an invalid MP4 error.
    pub fn invalid_mp4(msg: impl Into<String>) -> Self {
        Self::InvalidMp4(msg.into())
    }

    /// Create an inconsistent sample table error.
    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::InconsistentTable(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
