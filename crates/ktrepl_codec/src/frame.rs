//! Handshake and stream framing.
//!
//! A slave opens the session with a fixed 15-byte request and the master
//! answers with a single magic byte. The master then streams frames:
//!
//! ```text
//! sync:  0xB0 | timestamp_ns:u64
//! entry: 0xB1 | timestamp_ns:u64 | length:u32 | payload[length]
//! ```
//!
//! After each sync frame the slave writes one [`MAGIC_REPLICATION`] byte to
//! keep polling.

use crate::error::{CodecError, CodecResult};
use crate::reader::WireReader;
use bytes::BufMut;

/// Replication magic: handshake request/response, entry frame tag, poll byte.
pub const MAGIC_REPLICATION: u8 = 0xB1;

/// Sync frame tag: the slave has caught up with the log tail.
pub const MAGIC_SYNC: u8 = 0xB0;

/// Error reply from the master.
pub const MAGIC_ERROR: u8 = 0xBF;

/// Size of an encoded handshake request.
pub const HANDSHAKE_LEN: usize = 15;

/// Size of a frame header: tag (1) + timestamp (8).
pub const FRAME_HEADER_LEN: usize = 9;

/// Size of the payload length field of an entry frame.
pub const ENTRY_LENGTH_LEN: usize = 4;

/// Largest entry payload accepted from the wire (256 MiB).
pub const MAX_PAYLOAD_LEN: u32 = 256 * 1024 * 1024;

/// The request a slave sends to start replication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Reserved flags, zero.
    pub flags: u32,
    /// Replicate entries logged at or after this time (nanoseconds since the epoch).
    pub since_ns: u64,
    /// Id of the requesting slave.
    pub slave_id: u16,
}

impl HandshakeRequest {
    /// Creates a handshake request with zero flags.
    pub fn new(since_ns: u64, slave_id: u16) -> Self {
        Self {
            flags: 0,
            since_ns,
            slave_id,
        }
    }

    /// Encodes the request.
    pub fn encode(&self) -> [u8; HANDSHAKE_LEN] {
        let mut out = [0u8; HANDSHAKE_LEN];
        let mut buf = &mut out[..];
        buf.put_u8(MAGIC_REPLICATION);
        buf.put_u32(self.flags);
        buf.put_u64(self.since_ns);
        buf.put_u16(self.slave_id);
        out
    }

    /// Decodes a request, as a master would.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut reader = WireReader::new(bytes);
        let magic = reader.read_u8()?;
        if magic != MAGIC_REPLICATION {
            return Err(CodecError::invalid_structure(format!(
                "handshake magic {magic:#04x}, expected {MAGIC_REPLICATION:#04x}"
            )));
        }
        let flags = reader.read_u32()?;
        let since_ns = reader.read_u64()?;
        let slave_id = reader.read_u16()?;
        reader.finish()?;
        Ok(Self {
            flags,
            since_ns,
            slave_id,
        })
    }
}

/// Tag byte opening every stream frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTag {
    /// No more data for now; poll again.
    Sync,
    /// A log entry follows.
    Entry,
}

impl FrameTag {
    /// Converts a byte to a frame tag.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            MAGIC_SYNC => Some(Self::Sync),
            MAGIC_REPLICATION => Some(Self::Entry),
            _ => None,
        }
    }

    /// Converts the tag to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Sync => MAGIC_SYNC,
            Self::Entry => MAGIC_REPLICATION,
        }
    }
}

/// Parses the 9-byte header common to all frames.
pub fn decode_frame_header(header: &[u8; FRAME_HEADER_LEN]) -> CodecResult<(FrameTag, u64)> {
    let mut reader = WireReader::new(header);
    let tag_byte = reader.read_u8()?;
    let tag = FrameTag::from_byte(tag_byte).ok_or(CodecError::UnknownFrameTag(tag_byte))?;
    let timestamp_ns = reader.read_u64()?;
    Ok((tag, timestamp_ns))
}

/// Parses and bounds-checks the length field of an entry frame.
pub fn decode_entry_length(field: &[u8; ENTRY_LENGTH_LEN]) -> CodecResult<usize> {
    let len = u32::from_be_bytes(*field);
    if len > MAX_PAYLOAD_LEN {
        return Err(CodecError::SizeLimitExceeded {
            claimed: u64::from(len),
            max_allowed: u64::from(MAX_PAYLOAD_LEN),
        });
    }
    Ok(len as usize)
}

/// A complete stream frame, as produced by a master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Caught up with the log tail.
    Sync {
        /// Master clock at the time of the frame.
        timestamp_ns: u64,
    },
    /// An encoded log entry.
    Entry {
        /// Time the entry was logged.
        timestamp_ns: u64,
        /// Entry payload, see [`crate::LogEntry`].
        payload: Vec<u8>,
    },
}

impl Frame {
    /// Returns the tag of this frame.
    pub fn tag(&self) -> FrameTag {
        match self {
            Self::Sync { .. } => FrameTag::Sync,
            Self::Entry { .. } => FrameTag::Entry,
        }
    }

    /// Returns the frame timestamp.
    pub fn timestamp_ns(&self) -> u64 {
        match self {
            Self::Sync { timestamp_ns } | Self::Entry { timestamp_ns, .. } => *timestamp_ns,
        }
    }

    /// Encodes the frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::SizeLimitExceeded`] if the payload is larger
    /// than [`MAX_PAYLOAD_LEN`].
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        match self {
            Self::Sync { timestamp_ns } => {
                let mut buf = Vec::with_capacity(FRAME_HEADER_LEN);
                buf.put_u8(MAGIC_SYNC);
                buf.put_u64(*timestamp_ns);
                Ok(buf)
            }
            Self::Entry {
                timestamp_ns,
                payload,
            } => {
                let len = u32::try_from(payload.len())
                    .ok()
                    .filter(|len| *len <= MAX_PAYLOAD_LEN)
                    .ok_or(CodecError::SizeLimitExceeded {
                        claimed: payload.len() as u64,
                        max_allowed: u64::from(MAX_PAYLOAD_LEN),
                    })?;
                let mut buf =
                    Vec::with_capacity(FRAME_HEADER_LEN + ENTRY_LENGTH_LEN + payload.len());
                buf.put_u8(MAGIC_REPLICATION);
                buf.put_u64(*timestamp_ns);
                buf.put_u32(len);
                buf.put_slice(payload);
                Ok(buf)
            }
        }
    }
}
