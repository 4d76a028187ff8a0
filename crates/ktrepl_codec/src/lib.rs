//! # ktrepl Codec
//!
//! Wire codec for the Kyoto Tycoon replication log protocol.
//!
//! This crate provides:
//! - `HandshakeRequest` and the stream frame layout
//! - `LogEntry` payload encoding/decoding
//! - Varnum (7-bit continuation) integers
//! - A bounds-checked big-endian `WireReader`
//! - Hex helpers for tooling and test vectors
//!
//! This is a pure codec crate with no I/O operations.
//!
//! ## Usage
//!
//! ```
//! use ktrepl_codec::{LogEntry, Operation};
//!
//! let entry = LogEntry::set(7, 0, b"foo".to_vec(), b"bar".to_vec(), 0);
//! let bytes = entry.encode().unwrap();
//!
//! let decoded = LogEntry::decode(&bytes).unwrap();
//! assert_eq!(decoded, entry);
//! assert!(matches!(decoded.operation, Operation::Set { .. }));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entry;
mod error;
mod frame;
mod hex;
mod reader;
mod varnum;

pub use entry::{LogEntry, OpCode, Operation, XT_MAX};
pub use error::{CodecError, CodecResult};
pub use frame::{
    decode_entry_length, decode_frame_header, Frame, FrameTag, HandshakeRequest,
    ENTRY_LENGTH_LEN, FRAME_HEADER_LEN, HANDSHAKE_LEN, MAGIC_ERROR, MAGIC_REPLICATION,
    MAGIC_SYNC, MAX_PAYLOAD_LEN,
};
pub use hex::{from_hex, to_hex};
pub use reader::WireReader;
pub use varnum::{decode_varnum, encode_varnum, varnum_len, MAX_VARNUM_LEN};
