//! Uncompressed codecs.
//!
//! - `raw5`: five `u8` taste channels per frame, stored verbatim
//! - `rmix`: any number of `u16` mixing levels per frame, little-endian

use bytes::{BufMut, Bytes, BytesMut};

use crate::{registry::Codec, CodecError, Dtype, Frame};

/// Number of channels in a `raw5` frame.
pub const RAW5_CHANNELS: usize = 5;

/// Five-channel 8-bit codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct Raw5;

impl Codec for Raw5 {
    fn name(&self) -> &str {
        "raw5"
    }

    fn encode(&self, frame: &Frame) -> Result<Bytes, CodecError> {
        let Frame::U8(values) = frame else {
            return Err(CodecError::DtypeMismatch {
                codec: self.name().to_string(),
                expected: Dtype::U8,
                actual: frame.dtype(),
            });
        };
        if values.len() != RAW5_CHANNELS {
            return Err(CodecError::ShapeMismatch {
                codec: self.name().to_string(),
                expected: RAW5_CHANNELS,
                actual: values.len(),
            });
        }
        Ok(Bytes::copy_from_slice(values))
    }

    fn decode(&self, data: &[u8]) -> Result<Frame, CodecError> {
        Ok(Frame::U8(data.to_vec()))
    }
}

/// Variable-length 16-bit codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct Rmix;

impl Codec for Rmix {
    fn name(&self) -> &str {
        "rmix"
    }

    fn encode(&self, frame: &Frame) -> Result<Bytes, CodecError> {
        let Frame::U16(values) = frame else {
            return Err(CodecError::DtypeMismatch {
                codec: self.name().to_string(),
                expected: Dtype::U16,
                actual: frame.dtype(),
            });
        };
        let mut buf = BytesMut::with_capacity(values.len() * 2);
        for &v in values {
            buf.put_u16_le(v);
        }
        Ok(buf.freeze())
    }

    fn decode(&self, data: &[u8]) -> Result<Frame, CodecError> {
        if data.len() % 2 != 0 {
            return Err(CodecError::malformed(
                self.name(),
                format!("odd byte length {}", data.len()),
            ));
        }
        let values = data
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Frame::U16(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw5_rejects_wrong_dtype() {
        let err = Raw5.encode(&Frame::U16(vec![1, 2, 3, 4, 5])).unwrap_err();
        assert!(matches!(err, CodecError::DtypeMismatch { expected: Dtype::U8, .. }));
    }

    #[test]
    fn test_raw5_rejects_wrong_shape() {
        let err = Raw5.encode(&Frame::U8(vec![1, 2, 3])).unwrap_err();
        assert_eq!(
            err,
            CodecError::ShapeMismatch {
                codec: "raw5".to_string(),
                expected: 5,
                actual: 3,
            }
        );
    }

    #[test]
    fn test_rmix_little_endian() {
        let bytes = Rmix.encode(&Frame::U16(vec![0x0102, 0xffee])).unwrap();
        assert_eq!(&bytes[..], &[0x02, 0x01, 0xee, 0xff]);
        assert_eq!(
            Rmix.decode(&bytes).unwrap(),
            Frame::U16(vec![0x0102, 0xffee])
        );
    }

    #[test]
    fn test_rmix_odd_length_is_malformed() {
        assert!(matches!(
            Rmix.decode(&[1, 2, 3]),
            Err(CodecError::Malformed { .. })
        ));
    }
}
