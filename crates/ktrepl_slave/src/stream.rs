//! Streaming decode of a replication session.
//!
//! A [`LogStream`] owns the connection of one session and turns the frames
//! sent by the master into [`LogEntry`] values, one frame per read. It never
//! reads ahead: bytes are pulled from the connection only for the frame
//! being decoded, and an entry is yielded as soon as its frame is complete.

use crate::connection::Connection;
use crate::error::{ReplicationError, ReplicationResult};
use crate::stats::SessionStats;
use ktrepl_codec::{
    decode_entry_length, decode_frame_header, CodecError, FrameTag, LogEntry, ENTRY_LENGTH_LEN,
    FRAME_HEADER_LEN, MAGIC_REPLICATION,
};
use parking_lot::{Mutex, RwLock};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// State of a replication session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the next frame after an entry (or right after the handshake).
    AwaitingFrame,
    /// Caught up with the log tail; the poll byte was sent and the session
    /// waits for new data.
    PolledAfterSync,
    /// The connection is closed. No more entries will be produced.
    Closed,
}

/// Handle the client keeps to close the active session from another thread.
pub(crate) struct ActiveSession<C> {
    pub(crate) handle: C,
    pub(crate) cancelled: Arc<AtomicBool>,
}

/// Slot holding the client's handle to its most recent session.
pub(crate) type ActiveSlot<C> = Arc<Mutex<Option<ActiveSession<C>>>>;

/// A live replication session.
///
/// Iterating yields entries in the order the master logged them. The
/// iterator blocks while the master has nothing new and only ends when the
/// session is closed. After an error has been yielded the session is closed
/// and the iterator is fused.
///
/// Dropping the stream closes its connection.
pub struct LogStream<C: Connection = TcpStream> {
    conn: Option<C>,
    slave_id: u16,
    state: SessionState,
    last_timestamp: Option<u64>,
    stats: Arc<RwLock<SessionStats>>,
    cancelled: Arc<AtomicBool>,
    active: ActiveSlot<C>,
}

impl<C: Connection> LogStream<C> {
    pub(crate) fn new(
        conn: C,
        slave_id: u16,
        stats: Arc<RwLock<SessionStats>>,
        cancelled: Arc<AtomicBool>,
        active: ActiveSlot<C>,
    ) -> Self {
        Self {
            conn: Some(conn),
            slave_id,
            state: SessionState::AwaitingFrame,
            last_timestamp: None,
            stats,
            cancelled,
            active,
        }
    }

    /// Returns the current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the id of the consuming slave.
    pub fn slave_id(&self) -> u16 {
        self.slave_id
    }

    /// Returns the timestamp of the last frame received, entry or sync.
    ///
    /// After a failure, passing this to
    /// [`ReplicationClient::consume_from_ns`](crate::ReplicationClient::consume_from_ns)
    /// resumes replication where the session stopped.
    pub fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    /// Returns a snapshot of the client's counters.
    pub fn stats(&self) -> SessionStats {
        self.stats.read().clone()
    }

    /// Returns true while the connection is open.
    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Closes the session.
    ///
    /// Returns `true` if this call closed an open connection, `false` if it
    /// was already closed. Shutdown errors are logged and ignored.
    pub fn close(&mut self) -> bool {
        self.state = SessionState::Closed;
        let Some(conn) = self.conn.take() else {
            return false;
        };

        if let Err(err) = conn.shutdown() {
            if err.kind() != io::ErrorKind::NotConnected {
                warn!(slave_id = self.slave_id, error = %err, "failed to shut down connection");
            }
        }

        let mut active = self.active.lock();
        if active
            .as_ref()
            .is_some_and(|session| Arc::ptr_eq(&session.cancelled, &self.cancelled))
        {
            *active = None;
        }

        debug!(slave_id = self.slave_id, "replication session closed");
        true
    }

    /// Reads frames until an entry is complete.
    ///
    /// Sync frames are answered with a poll byte and reading continues.
    /// Returns `Ok(None)` once the session is closed.
    fn next_entry(&mut self) -> ReplicationResult<Option<LogEntry>> {
        loop {
            let Some(conn) = self.conn.as_mut() else {
                return Ok(None);
            };

            let mut header = [0u8; FRAME_HEADER_LEN];
            read_full(conn, &mut header)?;
            let (tag, timestamp_ns) = decode_frame_header(&header).map_err(|err| match err {
                CodecError::UnknownFrameTag(tag) => ReplicationError::UnknownFrameTag(tag),
                other => other.into(),
            })?;
            self.last_timestamp = Some(timestamp_ns);

            match tag {
                FrameTag::Sync => {
                    self.stats.write().record_sync(timestamp_ns);
                    conn.write_all(&[MAGIC_REPLICATION])?;
                    conn.flush()?;
                    self.stats.write().record_poll();
                    if self.state != SessionState::PolledAfterSync {
                        debug!(slave_id = self.slave_id, timestamp_ns, "caught up with log tail");
                    }
                    self.state = SessionState::PolledAfterSync;
                }
                FrameTag::Entry => {
                    let mut len_field = [0u8; ENTRY_LENGTH_LEN];
                    read_full(conn, &mut len_field)?;
                    let len = decode_entry_length(&len_field)?;

                    let mut payload = vec![0u8; len];
                    read_full(conn, &mut payload)?;
                    let entry = LogEntry::decode(&payload)?;

                    if entry.source_id == self.slave_id {
                        return Err(ReplicationError::SelfOrigin {
                            slave_id: self.slave_id,
                        });
                    }

                    trace!(
                        slave_id = self.slave_id,
                        timestamp_ns,
                        source_id = entry.source_id,
                        database_index = entry.database_index,
                        op = entry.op_code().name(),
                        "replicated entry"
                    );
                    self.stats.write().record_entry(&entry, len, timestamp_ns);
                    self.state = SessionState::AwaitingFrame;
                    return Ok(Some(entry));
                }
            }
        }
    }
}

impl<C: Connection> Iterator for LogStream<C> {
    type Item = ReplicationResult<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == SessionState::Closed {
            return None;
        }

        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.close();
                None
            }
            Err(_) if self.cancelled.load(Ordering::SeqCst) => {
                // Closed from another thread while blocked in a read.
                self.close();
                None
            }
            Err(err) => {
                error!(slave_id = self.slave_id, error = %err, "replication session failed");
                self.close();
                Some(Err(err))
            }
        }
    }
}

impl<C: Connection> Drop for LogStream<C> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<C: Connection> std::fmt::Debug for LogStream<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStream")
            .field("slave_id", &self.slave_id)
            .field("state", &self.state)
            .field("last_timestamp", &self.last_timestamp)
            .finish_non_exhaustive()
    }
}

/// Fills `buf` completely.
///
/// Unlike [`Read::read_exact`], a premature end of stream reports how many
/// bytes did arrive, so a half-received field is never mistaken for data.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> ReplicationResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(ReplicationError::ShortRead {
                    expected: buf.len(),
                    received: filled,
                })
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MockConnection;
    use ktrepl_codec::Frame;

    fn entry_frame(timestamp_ns: u64, entry: &LogEntry) -> Frame {
        Frame::Entry {
            timestamp_ns,
            payload: entry.encode().unwrap(),
        }
    }

    fn stream(conn: &MockConnection, slave_id: u16) -> LogStream<MockConnection> {
        LogStream::new(
            conn.clone(),
            slave_id,
            Arc::default(),
            Arc::default(),
            Arc::default(),
        )
    }

    #[test]
    fn yields_entries_in_order() {
        let conn = MockConnection::new();
        let first = LogEntry::set(7, 0, b"a".to_vec(), b"1".to_vec(), 0);
        let second = LogEntry::remove(7, 0, b"a".to_vec());
        conn.push_frame(&entry_frame(10, &first)).unwrap();
        conn.push_frame(&entry_frame(11, &second)).unwrap();

        let mut stream = stream(&conn, 42);
        assert_eq!(stream.next().unwrap().unwrap(), first);
        assert_eq!(stream.last_timestamp(), Some(10));
        assert_eq!(stream.next().unwrap().unwrap(), second);
        assert_eq!(stream.last_timestamp(), Some(11));
        assert_eq!(stream.state(), SessionState::AwaitingFrame);
    }

    #[test]
    fn sync_sends_one_poll_byte_and_continues() {
        let conn = MockConnection::new();
        let entry = LogEntry::clear(3, 1);
        conn.push_frame(&Frame::Sync { timestamp_ns: 50 }).unwrap();
        conn.push_frame(&entry_frame(51, &entry)).unwrap();

        let mut stream = stream(&conn, 42);
        assert_eq!(stream.next().unwrap().unwrap(), entry);
        assert_eq!(conn.written(), vec![MAGIC_REPLICATION]);
        assert_eq!(stream.stats().sync_frames, 1);
        assert_eq!(stream.stats().polls_sent, 1);
    }

    #[test]
    fn failed_poll_is_not_counted() {
        let conn = MockConnection::new();
        conn.push_frame(&Frame::Sync { timestamp_ns: 7 }).unwrap();
        conn.fail_writes(io::ErrorKind::BrokenPipe);

        let mut stream = stream(&conn, 42);
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(err, ReplicationError::Io(_)));
        assert_eq!(stream.stats().sync_frames, 1);
        assert_eq!(stream.stats().polls_sent, 0);
        assert_eq!(stream.last_timestamp(), Some(7));
        assert!(conn.written().is_empty());
    }

    #[test]
    fn state_after_sync_is_polled() {
        let conn = MockConnection::new();
        conn.push_frame(&Frame::Sync { timestamp_ns: 1 }).unwrap();
        // Nothing after the sync frame: the read of the next frame fails.
        conn.fail_at_end(io::ErrorKind::TimedOut);

        let mut stream = stream(&conn, 42);
        let result = stream.next_entry();
        assert!(matches!(result, Err(ReplicationError::Timeout)));
        assert_eq!(stream.state(), SessionState::PolledAfterSync);
        assert_eq!(stream.last_timestamp(), Some(1));
        assert_eq!(conn.written(), vec![MAGIC_REPLICATION]);
    }

    #[test]
    fn repeated_syncs_each_get_a_poll() {
        let conn = MockConnection::new();
        for ts in 0..3 {
            conn.push_frame(&Frame::Sync { timestamp_ns: ts }).unwrap();
        }
        conn.push_frame(&entry_frame(3, &LogEntry::clear(1, 0)))
            .unwrap();

        let mut stream = stream(&conn, 2);
        assert!(stream.next().unwrap().is_ok());
        assert_eq!(conn.written(), vec![MAGIC_REPLICATION; 3]);
    }

    #[test]
    fn self_origin_is_fatal() {
        let conn = MockConnection::new();
        conn.push_frame(&entry_frame(1, &LogEntry::remove(42, 0, b"k".to_vec())))
            .unwrap();
        conn.push_frame(&entry_frame(2, &LogEntry::remove(7, 0, b"k".to_vec())))
            .unwrap();

        let mut stream = stream(&conn, 42);
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(err, ReplicationError::SelfOrigin { slave_id: 42 }));
        assert!(err.is_protocol_error());
        assert!(stream.next().is_none());
        assert!(conn.is_shutdown());
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let conn = MockConnection::new();
        conn.push_input(vec![0xBF, 0, 0, 0, 0, 0, 0, 0, 0]);

        let mut stream = stream(&conn, 1);
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(err, ReplicationError::UnknownFrameTag(0xBF)));
        assert_eq!(stream.state(), SessionState::Closed);
    }

    #[test]
    fn short_read_in_timestamp() {
        let conn = MockConnection::new();
        conn.push_input(vec![0xB1, 0, 0, 0]);

        let mut stream = stream(&conn, 1);
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            ReplicationError::ShortRead {
                expected: 9,
                received: 4
            }
        ));
        assert!(err.is_connection_error());
        assert!(stream.next().is_none());
    }

    #[test]
    fn short_read_in_payload() {
        let conn = MockConnection::new();
        let bytes = entry_frame(1, &LogEntry::set(1, 0, b"key".to_vec(), b"value".to_vec(), 0))
            .encode()
            .unwrap();
        conn.push_input(bytes[..bytes.len() - 2].to_vec());

        let mut stream = stream(&conn, 9);
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(err, ReplicationError::ShortRead { .. }));
    }

    #[test]
    fn fields_split_across_reads() {
        let conn = MockConnection::new();
        let entry = LogEntry::set(5, 3, b"split".to_vec(), b"reads".to_vec(), 77);
        for byte in entry_frame(8, &entry).encode().unwrap() {
            conn.push_input(vec![byte]);
        }

        let mut stream = stream(&conn, 1);
        assert_eq!(stream.next().unwrap().unwrap(), entry);
    }

    #[test]
    fn payload_with_trailing_bytes_is_rejected() {
        let conn = MockConnection::new();
        let mut payload = LogEntry::clear(1, 0).encode().unwrap();
        payload.push(0x00);
        conn.push_frame(&Frame::Entry {
            timestamp_ns: 1,
            payload,
        })
        .unwrap();
        // A valid frame afterwards must not be reached.
        conn.push_frame(&entry_frame(2, &LogEntry::clear(1, 0)))
            .unwrap();

        let mut stream = stream(&conn, 9);
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            ReplicationError::Codec(CodecError::TrailingBytes { remaining: 1 })
        ));
        assert!(stream.next().is_none());
    }

    #[test]
    fn oversized_length_is_rejected_before_reading() {
        let conn = MockConnection::new();
        let mut bytes = vec![0xB1, 0, 0, 0, 0, 0, 0, 0, 1];
        bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        conn.push_input(bytes);

        let mut stream = stream(&conn, 9);
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            ReplicationError::Codec(CodecError::SizeLimitExceeded { .. })
        ));
    }

    #[test]
    fn close_is_idempotent() {
        let conn = MockConnection::new();
        let mut stream = stream(&conn, 1);
        assert!(stream.is_open());
        assert!(stream.close());
        assert!(!stream.close());
        assert!(conn.is_shutdown());
        assert!(stream.next().is_none());
    }

    #[test]
    fn drop_closes_connection() {
        let conn = MockConnection::new();
        drop(stream(&conn, 1));
        assert!(conn.is_shutdown());
    }

    #[test]
    fn read_full_retries_interrupted() {
        struct Flaky {
            interrupted: bool,
        }
        impl Read for Flaky {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                if !self.interrupted {
                    self.interrupted = true;
                    return Err(io::Error::from(io::ErrorKind::Interrupted));
                }
                buf.fill(7);
                Ok(buf.len())
            }
        }

        let mut buf = [0u8; 3];
        read_full(&mut Flaky { interrupted: false }, &mut buf).unwrap();
        assert_eq!(buf, [7, 7, 7]);
    }
}
