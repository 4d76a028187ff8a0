//! Error types for the slave client.

use ktrepl_codec::CodecError;
use std::io;
use thiserror::Error;

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Errors that can occur while consuming a replication log.
///
/// Errors fall into three kinds:
/// - protocol errors: the master sent bytes that do not follow the protocol
/// - connection errors: the network failed (refused, reset, timed out, short read)
/// - configuration errors: the client was set up with invalid values
///
/// All of them end the current session. The client never retries; callers
/// decide whether to reconnect, typically only for connection errors.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// The slave id is outside the 16-bit unsigned range.
    #[error("invalid slave id {0}: must be within 0..=65535")]
    InvalidSlaveId(i64),

    /// Other invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Connecting to the master failed.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Address of the master.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Reading from or writing to the connection failed.
    #[error("connection error: {0}")]
    Io(#[source] io::Error),

    /// The connection ended in the middle of a field.
    #[error("no data while reading: expected {expected} bytes, received {received}")]
    ShortRead {
        /// Bytes requested.
        expected: usize,
        /// Bytes received before the stream ended.
        received: usize,
    },

    /// A read or write exceeded the configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// The master answered the handshake with an unexpected byte.
    #[error("bad handshake magic: expected {expected:#04x}, received {received:#04x}")]
    BadMagic {
        /// Expected magic.
        expected: u8,
        /// Received byte.
        received: u8,
    },

    /// The master answered the handshake with its error magic.
    #[error("master rejected the replication request")]
    ServerRejected,

    /// A frame started with an unknown tag.
    #[error("unknown frame tag: {0:#04x}")]
    UnknownFrameTag(u8),

    /// The master sent back an entry that originated from this slave.
    #[error("received entry originating from this slave (id {slave_id})")]
    SelfOrigin {
        /// Id of this slave.
        slave_id: u16,
    },

    /// An entry payload could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ReplicationError {
    /// Returns true if the master violated the protocol.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::BadMagic { .. }
                | Self::ServerRejected
                | Self::UnknownFrameTag(_)
                | Self::SelfOrigin { .. }
                | Self::Codec(_)
        )
    }

    /// Returns true if the network failed.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Io(_) | Self::ShortRead { .. } | Self::Timeout
        )
    }

    /// Returns true if reconnecting may succeed.
    ///
    /// Only connection errors qualify; a protocol error would most likely
    /// repeat on a fresh session.
    pub fn is_retryable(&self) -> bool {
        self.is_connection_error()
    }
}

impl From<io::Error> for ReplicationError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout,
            _ => Self::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        let protocol = [
            ReplicationError::BadMagic {
                expected: 0xB1,
                received: 0xBF,
            },
            ReplicationError::ServerRejected,
            ReplicationError::UnknownFrameTag(0x00),
            ReplicationError::SelfOrigin { slave_id: 1 },
            ReplicationError::Codec(CodecError::UnknownOpCode(0xA9)),
        ];
        for err in &protocol {
            assert!(err.is_protocol_error(), "{err}");
            assert!(!err.is_connection_error(), "{err}");
            assert!(!err.is_retryable(), "{err}");
        }

        let connection = [
            ReplicationError::Io(io::Error::from(io::ErrorKind::ConnectionReset)),
            ReplicationError::ShortRead {
                expected: 8,
                received: 3,
            },
            ReplicationError::Timeout,
        ];
        for err in &connection {
            assert!(err.is_connection_error(), "{err}");
            assert!(err.is_retryable(), "{err}");
            assert!(!err.is_protocol_error(), "{err}");
        }

        let config = ReplicationError::InvalidSlaveId(70_000);
        assert!(!config.is_protocol_error());
        assert!(!config.is_connection_error());
    }

    #[test]
    fn io_timeouts_map_to_timeout() {
        let err: ReplicationError = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert!(matches!(err, ReplicationError::Timeout));
        let err: ReplicationError = io::Error::from(io::ErrorKind::TimedOut).into();
        assert!(matches!(err, ReplicationError::Timeout));
        let err: ReplicationError = io::Error::from(io::ErrorKind::ConnectionReset).into();
        assert!(matches!(err, ReplicationError::Io(_)));
    }

    #[test]
    fn error_display() {
        let err = ReplicationError::ShortRead {
            expected: 4,
            received: 0,
        };
        assert!(err.to_string().starts_with("no data while reading"));

        let err = ReplicationError::BadMagic {
            expected: 0xB1,
            received: 0x00,
        };
        assert_eq!(
            err.to_string(),
            "bad handshake magic: expected 0xb1, received 0x00"
        );
    }
}
