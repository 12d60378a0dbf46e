//! Error types for flavmux-codec.

use crate::frame::Dtype;

/// Errors raised by codec encode/decode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The frame element type is not the one the codec accepts.
    #[error("{codec}: only {expected} frames are supported, got {actual}")]
    DtypeMismatch {
        codec: String,
        expected: Dtype,
        actual: Dtype,
    },

    /// The frame has the wrong number of elements.
    #[error("{codec}: expected {expected} elements per frame, got {actual}")]
    ShapeMismatch {
        codec: String,
        expected: usize,
        actual: usize,
    },

    /// Encoded sample bytes cannot be decoded.
    #[error("{codec}: malformed sample: {message}")]
    Malformed { codec: String, message: String },
}

impl CodecError {
    /// Create a malformed sample error.
    pub fn malformed(codec: &str, message: impl Into<String>) -> Self {
        Self::Malformed {
            codec: codec.to_string(),
            message: message.into(),
        }
    }
}
