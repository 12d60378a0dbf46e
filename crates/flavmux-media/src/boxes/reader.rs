//! Bounds-checked field reader over a box body.

use bytes::{Buf, Bytes};

use super::{FourCC, FullBoxHeader};
use crate::{Error, Result};

/// Reads big-endian fields from a box body, failing with
/// [`Error::Truncated`] instead of panicking when the body runs short.
pub(crate) struct BodyReader {
    box_type: FourCC,
    buf: Bytes,
}

impl BodyReader {
    pub(crate) fn new(box_type: FourCC, body: Bytes) -> Self {
        Self { box_type, buf: body }
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.remaining() < n {
            return Err(Error::Truncated {
                box_type: self.box_type,
                need: n,
                have: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16())
    }

    pub(crate) fn u24(&mut self) -> Result<u32> {
        self.need(3)?;
        Ok(self.buf.get_uint(3) as u32)
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        self.need(8)?;
        Ok(self.buf.get_u64())
    }

    /// 32-bit on version 0, 64-bit otherwise.
    pub(crate) fn versioned(&mut self, version: u8) -> Result<u64> {
        if version == 0 {
            self.u32().map(u64::from)
        } else {
            self.u64()
        }
    }

    pub(crate) fn fourcc(&mut self) -> Result<FourCC> {
        Ok(FourCC(self.array()?))
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.need(N)?;
        let mut out = [0u8; N];
        self.buf.copy_to_slice(&mut out);
        Ok(out)
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<Bytes> {
        self.need(n)?;
        Ok(self.buf.copy_to_bytes(n))
    }

    pub(crate) fn full_header(&mut self) -> Result<FullBoxHeader> {
        let version = self.u8()?;
        let flags = self.u24()?;
        Ok(FullBoxHeader { version, flags })
    }

    /// Entry count for a table of `entry_size`-byte records, checked against
    /// what is left so a corrupt count cannot drive a huge allocation.
    pub(crate) fn table_len(&mut self, entry_size: usize) -> Result<usize> {
        let count = self.u32()? as usize;
        self.need(count.saturating_mul(entry_size))?;
        Ok(count)
    }

    /// Everything not yet read.
    pub(crate) fn rest(&mut self) -> Bytes {
        self.buf.split_off(0)
    }

    /// Fails if any bytes were left unread.
    pub(crate) fn finish(self) -> Result<()> {
        if self.buf.has_remaining() {
            return Err(Error::invalid_mp4(format!(
                "{}: {} unexpected trailing bytes",
                self.box_type,
                self.buf.remaining()
            )));
        }
        Ok(())
    }
}
