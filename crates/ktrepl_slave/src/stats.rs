//! Session counters.

use ktrepl_codec::{LogEntry, OpCode};

/// Counters accumulated across all sessions of a client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Sessions that completed the handshake.
    pub sessions_opened: u64,
    /// `Set` entries received.
    pub sets: u64,
    /// `Remove` entries received.
    pub removes: u64,
    /// `Clear` entries received.
    pub clears: u64,
    /// Sync frames received.
    pub sync_frames: u64,
    /// Poll bytes sent in answer to sync frames.
    pub polls_sent: u64,
    /// Entry payload bytes received.
    pub payload_bytes: u64,
    /// Timestamp of the most recent frame.
    pub last_timestamp_ns: Option<u64>,
}

impl SessionStats {
    /// Total entries received.
    pub fn entries(&self) -> u64 {
        self.sets + self.removes + self.clears
    }

    pub(crate) fn record_entry(&mut self, entry: &LogEntry, payload_len: usize, timestamp_ns: u64) {
        match entry.op_code() {
            OpCode::Set => self.sets += 1,
            OpCode::Remove => self.removes += 1,
            OpCode::Clear => self.clears += 1,
        }
        self.payload_bytes += payload_len as u64;
        self.last_timestamp_ns = Some(timestamp_ns);
    }

    pub(crate) fn record_sync(&mut self, timestamp_ns: u64) {
        self.sync_frames += 1;
        self.last_timestamp_ns = Some(timestamp_ns);
    }

    pub(crate) fn record_poll(&mut self) {
        self.polls_sent += 1;
    }
}
