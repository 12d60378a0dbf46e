//! Codec registry keyed by four-character codec name.

use std::sync::Arc;

use bytes::Bytes;

use crate::{CodecError, Frame, Raw5, Rmix};

/// An encode/decode pair for one sample format.
///
/// The name is the four-character code written into the track's sample
/// description, so it must be exactly 4 ASCII bytes.
pub trait Codec: Send + Sync {
    /// Four-character codec identifier.
    fn name(&self) -> &str;

    /// Encode one frame into sample bytes.
    fn encode(&self, frame: &Frame) -> Result<Bytes, CodecError>;

    /// Decode sample bytes back into a frame.
    fn decode(&self, data: &[u8]) -> Result<Frame, CodecError>;
}

/// A registry of [`Codec`] implementations.
///
/// Codecs are kept in registration order. Registering a codec whose name is
/// already present replaces the earlier one, so callers can override the
/// built-in codecs.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Registry with the built-in `raw5` and `rmix` codecs.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Raw5));
        registry.register(Arc::new(Rmix));
        registry
    }

    /// Register a codec, replacing any codec with the same name.
    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        if let Some(slot) = self.codecs.iter_mut().find(|c| c.name() == codec.name()) {
            *slot = codec;
        } else {
            self.codecs.push(codec);
        }
    }

    /// Look up a codec by name.
    pub fn get(&self, name: &str) -> Option<&dyn Codec> {
        self.codecs
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    /// Names of all registered codecs, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.codecs.iter().map(|c| c.name()).collect()
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.names())
            .finish()
    }
}
