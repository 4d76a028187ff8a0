//! Bounds-checked reader over an in-memory wire buffer.

use crate::error::{CodecError, CodecResult};
use crate::varnum::decode_varnum;
use bytes::Buf;

/// A big-endian reader over a byte slice.
///
/// Every read checks the remaining length first, so malformed input yields
/// [`CodecError::UnexpectedEof`] instead of a panic.
pub struct WireReader<'a> {
    data: &'a [u8],
    total: usize,
}

impl<'a> WireReader<'a> {
    /// Create a new reader for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            total: data.len(),
        }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.total - self.data.len()
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &'a [u8] {
        self.data
    }

    /// Fails with [`CodecError::TrailingBytes`] unless the input is exhausted.
    pub fn finish(&self) -> CodecResult<()> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes {
                remaining: self.data.len(),
            })
        }
    }

    #[inline]
    fn ensure(&self, len: usize) -> CodecResult<()> {
        if self.data.remaining() < len {
            return Err(CodecError::eof(len, self.data.remaining()));
        }
        Ok(())
    }

    /// Reads one byte.
    #[inline]
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        self.ensure(1)?;
        Ok(self.data.get_u8())
    }

    /// Reads a big-endian `u16`.
    #[inline]
    pub fn read_u16(&mut self) -> CodecResult<u16> {
        self.ensure(2)?;
        Ok(self.data.get_u16())
    }

    /// Reads a big-endian `u32`.
    #[inline]
    pub fn read_u32(&mut self) -> CodecResult<u32> {
        self.ensure(4)?;
        Ok(self.data.get_u32())
    }

    /// Reads a big-endian `u64`.
    #[inline]
    pub fn read_u64(&mut self) -> CodecResult<u64> {
        self.ensure(8)?;
        Ok(self.data.get_u64())
    }

    /// Reads a 5-byte big-endian unsigned integer.
    #[inline]
    pub fn read_u40(&mut self) -> CodecResult<u64> {
        self.ensure(5)?;
        Ok(self.data.get_uint(5))
    }

    /// Reads exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        self.ensure(len)?;
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    /// Reads a varnum.
    pub fn read_varnum(&mut self) -> CodecResult<u64> {
        let (value, used) = decode_varnum(self.data)?;
        self.data.advance(used);
        Ok(value)
    }

    /// Reads a varnum length prefix followed by that many bytes.
    pub fn read_length_prefixed(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.read_varnum()?;
        let len = usize::try_from(len).map_err(|_| CodecError::SizeLimitExceeded {
            claimed: len,
            max_allowed: usize::MAX as u64,
        })?;
        self.read_bytes(len)
    }
}
