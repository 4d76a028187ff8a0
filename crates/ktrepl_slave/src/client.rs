//! The replication slave client.

use crate::config::SlaveConfig;
use crate::connection::{Connection, Connector, TcpConnector};
use crate::error::{ReplicationError, ReplicationResult};
use crate::stats::SessionStats;
use crate::stream::{read_full, ActiveSession, ActiveSlot, LogStream};
use crate::time::to_timestamp_ns;
use ktrepl_codec::{HandshakeRequest, MAGIC_ERROR, MAGIC_REPLICATION};
use parking_lot::RwLock;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// A slave consuming the replication log of a master.
///
/// Creating a client does not touch the network. Each call to
/// [`consume`](Self::consume) opens a new connection, performs the
/// handshake and returns a [`LogStream`] that owns the connection.
///
/// # Example
///
/// ```no_run
/// use ktrepl_slave::{ReplicationClient, SlaveConfig};
///
/// let client = ReplicationClient::new(SlaveConfig::new(42).with_host("10.0.0.5"));
/// for entry in client.consume(None)? {
///     let entry = entry?;
///     println!("{:?}", entry.operation);
/// }
/// # Ok::<(), ktrepl_slave::ReplicationError>(())
/// ```
pub struct ReplicationClient<K: Connector = TcpConnector> {
    config: SlaveConfig,
    connector: K,
    active: ActiveSlot<K::Conn>,
    stats: Arc<RwLock<SessionStats>>,
}

impl ReplicationClient<TcpConnector> {
    /// Creates a client connecting over TCP.
    pub fn new(config: SlaveConfig) -> Self {
        Self::with_connector(config, TcpConnector)
    }
}

impl<K: Connector> ReplicationClient<K> {
    /// Creates a client using a custom connector.
    pub fn with_connector(config: SlaveConfig, connector: K) -> Self {
        Self {
            config,
            connector,
            active: Arc::default(),
            stats: Arc::default(),
        }
    }

    /// Returns the client configuration.
    pub fn config(&self) -> &SlaveConfig {
        &self.config
    }

    /// Returns the slave id.
    pub fn slave_id(&self) -> u16 {
        self.config.slave_id
    }

    /// Returns the connector.
    pub fn connector(&self) -> &K {
        &self.connector
    }

    /// Returns a snapshot of the counters accumulated over all sessions.
    pub fn stats(&self) -> SessionStats {
        self.stats.read().clone()
    }

    /// Returns true while the most recent session is open.
    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Starts replicating entries logged at or after `since`.
    ///
    /// `None` means now: only entries written from this point on are
    /// received.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, the connection cannot be
    /// opened, or the master does not accept the handshake. On failure the
    /// connection is closed.
    pub fn consume(&self, since: Option<SystemTime>) -> ReplicationResult<LogStream<K::Conn>> {
        let since_ns = to_timestamp_ns(since.unwrap_or_else(SystemTime::now));
        self.consume_from_ns(since_ns)
    }

    /// Starts replicating entries logged at or after `since_ns`
    /// (nanoseconds since the Unix epoch).
    ///
    /// # Errors
    ///
    /// See [`consume`](Self::consume).
    pub fn consume_from_ns(&self, since_ns: u64) -> ReplicationResult<LogStream<K::Conn>> {
        self.config.validate()?;

        let slave_id = self.config.slave_id;
        debug!(
            addr = %self.config.address(),
            slave_id,
            since_ns,
            "opening replication session"
        );

        let mut conn = self.connector.connect(&self.config)?;
        let request = HandshakeRequest {
            flags: self.config.flags,
            since_ns,
            slave_id,
        };
        if let Err(err) = handshake(&mut conn, &request) {
            let _ = conn.shutdown();
            return Err(err);
        }

        let handle = match conn.try_clone() {
            Ok(handle) => handle,
            Err(err) => {
                let _ = conn.shutdown();
                return Err(err.into());
            }
        };
        let cancelled = Arc::new(AtomicBool::new(false));
        *self.active.lock() = Some(ActiveSession {
            handle,
            cancelled: Arc::clone(&cancelled),
        });
        self.stats.write().sessions_opened += 1;

        info!(addr = %self.config.address(), slave_id, since_ns, "replication session started");

        Ok(LogStream::new(
            conn,
            slave_id,
            Arc::clone(&self.stats),
            cancelled,
            Arc::clone(&self.active),
        ))
    }

    /// Closes the most recent session.
    ///
    /// Safe to call from another thread while the session's stream is
    /// blocked in a read; the stream then ends without an error. Returns
    /// `true` if an open session was closed, `false` if there was none.
    pub fn close(&self) -> bool {
        let Some(session) = self.active.lock().take() else {
            return false;
        };
        session.cancelled.store(true, Ordering::SeqCst);
        if let Err(err) = session.handle.shutdown() {
            warn!(slave_id = self.config.slave_id, error = %err, "failed to shut down connection");
        }
        debug!(slave_id = self.config.slave_id, "replication session closed by client");
        true
    }
}

impl<K: Connector> Drop for ReplicationClient<K> {
    fn drop(&mut self) {
        // Streams own their connections and outlive the client; only the
        // shared handle is released here.
        self.active.lock().take();
    }
}

impl<K: Connector> std::fmt::Debug for ReplicationClient<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationClient")
            .field("config", &self.config)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Sends the replication request and checks the master's answer.
fn handshake<C: Connection>(conn: &mut C, request: &HandshakeRequest) -> ReplicationResult<()> {
    conn.write_all(&request.encode())?;
    conn.flush()?;

    let mut response = [0u8; 1];
    read_full(conn, &mut response)?;
    match response[0] {
        MAGIC_REPLICATION => Ok(()),
        MAGIC_ERROR => Err(ReplicationError::ServerRejected),
        received => Err(ReplicationError::BadMagic {
            expected: MAGIC_REPLICATION,
            received,
        }),
    }
}
