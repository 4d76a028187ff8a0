//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding replication wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended before a complete field could be read.
    #[error("unexpected end of input: needed {needed} bytes, {available} available")]
    UnexpectedEof {
        /// Bytes required by the field being read.
        needed: usize,
        /// Bytes left in the input.
        available: usize,
    },

    /// A varnum does not fit in 64 bits.
    #[error("varnum overflows 64 bits")]
    VarnumOverflow,

    /// The operation code of an entry payload is not recognized.
    #[error("unknown operation code: {0:#04x}")]
    UnknownOpCode(u8),

    /// The frame tag is neither sync nor replication.
    #[error("unknown frame tag: {0:#04x}")]
    UnknownFrameTag(u8),

    /// Bytes remained after a well-formed entry was decoded.
    #[error("{remaining} trailing bytes after entry payload")]
    TrailingBytes {
        /// Number of unconsumed bytes.
        remaining: usize,
    },

    /// Expiration time does not fit in the 40-bit wire field.
    #[error("expire time {0} exceeds 40 bits")]
    ExpireTimeOutOfRange(u64),

    /// A length field claims more bytes than the codec accepts.
    #[error("size limit exceeded: claimed {claimed} bytes, max allowed {max_allowed}")]
    SizeLimitExceeded {
        /// Claimed length.
        claimed: u64,
        /// Maximum accepted length.
        max_allowed: u64,
    },

    /// Structurally invalid input.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },
}

impl CodecError {
    /// Create an unexpected end of input error.
    pub fn eof(needed: usize, available: usize) -> Self {
        Self::UnexpectedEof { needed, available }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}
