//! Typed frame arrays exchanged with codecs.

use std::fmt;

/// Element type of a [`Frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtype {
    U8,
    U16,
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dtype::U8 => write!(f, "uint8"),
            Dtype::U16 => write!(f, "uint16"),
        }
    }
}

/// One frame of sensor data, before encoding into a sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

impl Frame {
    /// Element type of this frame.
    pub fn dtype(&self) -> Dtype {
        match self {
            Frame::U8(_) => Dtype::U8,
            Frame::U16(_) => Dtype::U16,
        }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Frame::U8(v) => v.len(),
            Frame::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widen every element to `u32`, e.g. for JSON output.
    pub fn to_u32_vec(&self) -> Vec<u32> {
        match self {
            Frame::U8(v) => v.iter().map(|&x| x as u32).collect(),
            Frame::U16(v) => v.iter().map(|&x| x as u32).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_dtype_and_len() {
        let frame = Frame::U16(vec![1, 2, 3]);
        assert_eq!(frame.dtype(), Dtype::U16);
        assert_eq!(frame.len(), 3);
        assert!(!frame.is_empty());
        assert_eq!(frame.to_u32_vec(), vec![1, 2, 3]);
    }

    #[test]
    fn test_dtype_display() {
        assert_eq!(Dtype::U8.to_string(), "uint8");
        assert_eq!(Dtype::U16.to_string(), "uint16");
    }
}
