//! Variable-length unsigned integers ("varnums").
//!
//! A varnum stores an integer in big-endian groups of 7 bits. Every byte but
//! the last has its high bit set:
//!
//! ```text
//! 300 = 0b10_0101100  ->  [0x82, 0x2c]
//! ```

use crate::error::{CodecError, CodecResult};
use bytes::BufMut;

/// Maximum number of bytes a 64-bit varnum can occupy.
pub const MAX_VARNUM_LEN: usize = 10;

/// Returns the number of bytes the minimal encoding of `n` takes.
#[must_use]
pub fn varnum_len(n: u64) -> usize {
    let bits = 64 - n.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Appends the minimal varnum encoding of `n` to `buf`.
pub fn encode_varnum<B: BufMut>(n: u64, buf: &mut B) {
    let len = varnum_len(n);
    for group in (1..len).rev() {
        buf.put_u8(((n >> (7 * group)) & 0x7f) as u8 | 0x80);
    }
    buf.put_u8((n & 0x7f) as u8);
}

/// Decodes a varnum from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed. Non-minimal
/// encodings are accepted as long as they stay within [`MAX_VARNUM_LEN`]
/// bytes and the value fits in 64 bits.
///
/// # Errors
///
/// - [`CodecError::UnexpectedEof`] if the input ends before the final byte
/// - [`CodecError::VarnumOverflow`] if the value does not fit in a `u64`
pub fn decode_varnum(bytes: &[u8]) -> CodecResult<(u64, usize)> {
    let mut value: u64 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        if i == MAX_VARNUM_LEN || value >> 57 != 0 {
            return Err(CodecError::VarnumOverflow);
        }
        value = (value << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(CodecError::eof(bytes.len() + 1, bytes.len()))
}
