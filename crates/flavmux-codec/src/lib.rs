//! Flavmux-Codec: sample codecs for sensory tracks
//!
//! A codec turns one frame of a typed array into the opaque bytes stored as a
//! single MP4 sample, and back. The muxer never looks inside those bytes; it
//! only asks the [`CodecRegistry`] for the codec named by a track's sample
//! description (`raw5`, `rmix`, ...).
//!
//! # Example
//!
//! ```
//! use flavmux_codec::{CodecRegistry, Frame};
//!
//! let registry = CodecRegistry::with_defaults();
//! let raw5 = registry.get("raw5").unwrap();
//!
//! let bytes = raw5.encode(&Frame::U8(vec![1, 2, 3, 4, 5])).unwrap();
//! assert_eq!(bytes.len(), 5);
//! assert_eq!(raw5.decode(&bytes).unwrap(), Frame::U8(vec![1, 2, 3, 4, 5]));
//! ```

pub mod error;
pub mod frame;
pub mod raw;
pub mod registry;

pub use error::CodecError;
pub use frame::{Dtype, Frame};
pub use raw::{Raw5, Rmix};
pub use registry::{Codec, CodecRegistry};
