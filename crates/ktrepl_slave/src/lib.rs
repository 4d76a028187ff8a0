//! # ktrepl Slave
//!
//! Replication log slave client for Kyoto Tycoon masters.
//!
//! This crate provides:
//! - `ReplicationClient` to open replication sessions
//! - `LogStream`, a blocking iterator over replicated entries
//! - Live tailing: sync frames are answered with a poll and the stream
//!   keeps waiting for new entries
//! - A `Connector`/`Connection` seam with TCP and mock implementations
//! - `RetryConfig` for callers that reconnect after failures
//!
//! ## Session lifecycle
//!
//! ```text
//! consume() ──handshake──► AwaitingFrame ──sync──► PolledAfterSync
//!                              ▲   │                    │
//!                              │   └──entry──► yield    │
//!                              └───────entry────────────┘
//! any error / close() / drop ──► Closed
//! ```
//!
//! ## Key Invariants
//!
//! - Entries are yielded in log order, one frame at a time, no read-ahead
//! - A short read is an error, never a truncated frame
//! - An entry originating from this slave's own id is a protocol error
//! - The client never retries; every error ends the session
//! - Dropping a stream closes its connection

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod connection;
mod error;
mod stats;
mod stream;
mod time;

pub use client::ReplicationClient;
pub use config::{RetryConfig, SlaveConfig, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_TIMEOUT};
pub use connection::{Connection, Connector, MockConnection, MockConnector, TcpConnector};
pub use error::{ReplicationError, ReplicationResult};
pub use stats::SessionStats;
pub use stream::{LogStream, SessionState};
pub use time::{from_timestamp_ns, to_timestamp_ns};

pub use ktrepl_codec::{CodecError, LogEntry, OpCode, Operation, XT_MAX};
