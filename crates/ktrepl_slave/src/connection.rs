//! Connection layer abstraction for replication sessions.

use crate::config::SlaveConfig;
use crate::error::{ReplicationError, ReplicationResult};
use ktrepl_codec::{CodecResult, Frame};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use tracing::debug;

/// A byte stream to a replication master.
///
/// Besides reading and writing, a connection can be shut down through a
/// cloned handle, which is how a session blocked in a read is closed from
/// another thread.
pub trait Connection: Read + Write + Send + Sized {
    /// Shuts down both directions of the connection.
    fn shutdown(&self) -> io::Result<()>;

    /// Returns another handle to the same connection.
    fn try_clone(&self) -> io::Result<Self>;
}

impl Connection for TcpStream {
    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }

    fn try_clone(&self) -> io::Result<Self> {
        TcpStream::try_clone(self)
    }
}

/// Opens connections to a master.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (TCP, mock for testing, etc.).
pub trait Connector: Send + Sync {
    /// Connection type produced by this connector.
    type Conn: Connection + 'static;

    /// Connects to the master described by `config`.
    fn connect(&self, config: &SlaveConfig) -> ReplicationResult<Self::Conn>;
}

/// Blocking TCP connector.
///
/// Applies the configured timeout to connecting, reading and writing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Conn = TcpStream;

    fn connect(&self, config: &SlaveConfig) -> ReplicationResult<TcpStream> {
        let addr = config.address();
        let connect_err = |source: io::Error| ReplicationError::Connect {
            addr: addr.clone(),
            source,
        };

        let mut last_err = None;
        for socket_addr in addr.to_socket_addrs().map_err(connect_err)? {
            debug!(%socket_addr, "connecting to master");
            match TcpStream::connect_timeout(&socket_addr, config.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(config.timeout))?;
                    stream.set_write_timeout(Some(config.timeout))?;
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(connect_err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing")
        })))
    }
}

#[derive(Debug, Default)]
struct MockState {
    input: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    shutdown: bool,
    error_at_end: Option<io::ErrorKind>,
    write_error: Option<io::ErrorKind>,
}

/// A scripted in-memory connection for testing.
///
/// Reads return the queued input chunks one at a time (a chunk larger than
/// the read buffer is split), then end of stream. Everything written is
/// captured. Clones share state, like handles to one socket.
#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    /// Creates a connection with no input.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes to be read. Each call is delivered as a separate read.
    pub fn push_input(&self, bytes: impl Into<Vec<u8>>) -> &Self {
        self.state.lock().input.push_back(bytes.into());
        self
    }

    /// Queues an encoded frame.
    pub fn push_frame(&self, frame: &Frame) -> CodecResult<&Self> {
        let bytes = frame.encode()?;
        Ok(self.push_input(bytes))
    }

    /// Makes reads fail with `kind` once the input is exhausted, instead of
    /// reporting end of stream.
    pub fn fail_at_end(&self, kind: io::ErrorKind) -> &Self {
        self.state.lock().error_at_end = Some(kind);
        self
    }

    /// Makes every subsequent write fail with `kind`.
    pub fn fail_writes(&self, kind: io::ErrorKind) -> &Self {
        self.state.lock().write_error = Some(kind);
        self
    }

    /// Returns every byte written so far.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Returns true once the connection has been shut down.
    pub fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }
}

impl Read for MockConnection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.shutdown || buf.is_empty() {
            return Ok(0);
        }
        let Some(mut chunk) = state.input.pop_front() else {
            return match state.error_at_end {
                Some(kind) => Err(io::Error::from(kind)),
                None => Ok(0),
            };
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            state.input.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

impl Write for MockConnection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        if let Some(kind) = state.write_error {
            return Err(io::Error::from(kind));
        }
        state.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connection for MockConnection {
    fn shutdown(&self) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.shutdown {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        state.shutdown = true;
        Ok(())
    }

    fn try_clone(&self) -> io::Result<Self> {
        Ok(self.clone())
    }
}

/// A connector handing out prepared [`MockConnection`]s in order.
///
/// Once all connections are used up, connecting fails with
/// `ConnectionRefused`.
#[derive(Debug, Default)]
pub struct MockConnector {
    pending: Mutex<VecDeque<MockConnection>>,
    attempts: Mutex<usize>,
}

impl MockConnector {
    /// Creates a connector serving the given connections.
    pub fn new(connections: impl IntoIterator<Item = MockConnection>) -> Self {
        Self {
            pending: Mutex::new(connections.into_iter().collect()),
            attempts: Mutex::new(0),
        }
    }

    /// Number of connect calls made so far.
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }
}

impl Connector for MockConnector {
    type Conn = MockConnection;

    fn connect(&self, config: &SlaveConfig) -> ReplicationResult<MockConnection> {
        *self.attempts.lock() += 1;
        self.pending
            .lock()
            .pop_front()
            .ok_or_else(|| ReplicationError::Connect {
                addr: config.address(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_reads_chunks_then_eof() {
        let mut conn = MockConnection::new();
        conn.push_input(vec![1, 2, 3]).push_input(vec![4]);

        let mut buf = [0u8; 2];
        assert_eq!(conn.read(&mut buf).unwrap(), 2);
        assert_eq!(buf, [1, 2]);
        assert_eq!(conn.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 3);
        assert_eq!(conn.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 4);
        assert_eq!(conn.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn mock_error_at_end() {
        let mut conn = MockConnection::new();
        conn.fail_at_end(io::ErrorKind::ConnectionReset);
        let err = conn.read(&mut [0u8; 4]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn mock_clones_share_state() {
        let conn = MockConnection::new();
        let mut handle = conn.try_clone().unwrap();
        handle.write_all(&[0xB1]).unwrap();
        assert_eq!(conn.written(), vec![0xB1]);

        conn.shutdown().unwrap();
        assert!(handle.is_shutdown());
        assert!(handle.write_all(&[0xB1]).is_err());
        assert_eq!(handle.read(&mut [0u8; 1]).unwrap(), 0);
        assert!(conn.shutdown().is_err());
    }

    #[test]
    fn mock_connector_runs_out() {
        let connector = MockConnector::new([MockConnection::new()]);
        let config = SlaveConfig::new(1);
        assert!(connector.connect(&config).is_ok());
        let err = connector.connect(&config).unwrap_err();
        assert!(matches!(err, ReplicationError::Connect { .. }));
        assert!(err.is_retryable());
        assert_eq!(connector.attempts(), 2);
    }

    #[test]
    fn tcp_connect_refused() {
        // Bind then drop to get a port with nothing listening.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = SlaveConfig::new(1).with_port(port);
        let err = TcpConnector.connect(&config).unwrap_err();
        assert!(err.is_connection_error());
    }
}
