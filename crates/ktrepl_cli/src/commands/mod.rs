//! CLI command implementations.

pub mod decode;
pub mod output;
pub mod tail;

use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// Replication failed.
    #[error(transparent)]
    Replication(#[from] ktrepl_slave::ReplicationError),

    /// A payload could not be decoded.
    #[error("decode error: {0}")]
    Codec(#[from] ktrepl_codec::CodecError),

    /// Writing output failed.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),

    /// JSON serialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An argument was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
