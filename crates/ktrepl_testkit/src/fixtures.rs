//! A scripted replication master for integration tests.
//!
//! [`MockMaster`] listens on an ephemeral loopback port, accepts a single
//! slave, reads its handshake and then plays a script of [`MasterStep`]s.
//! Once the script is done it keeps the connection open and records
//! whatever the slave still sends until the slave disconnects.

use ktrepl_codec::{Frame, HandshakeRequest, LogEntry, HANDSHAKE_LEN, MAGIC_REPLICATION};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::debug;

/// How long the master waits on any single read before giving up.
const MASTER_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// One action of a [`MockMaster`] script.
#[derive(Debug, Clone)]
pub enum MasterStep {
    /// Answer the handshake (or write any single byte).
    Respond(u8),
    /// Send a frame.
    Send(Frame),
    /// Send raw bytes.
    SendRaw(Vec<u8>),
    /// Read one byte from the slave, expected to be a poll.
    ExpectPoll,
    /// Close the connection immediately, ending the script.
    Hangup,
}

impl MasterStep {
    /// Accept the handshake.
    pub fn accept() -> Self {
        Self::Respond(MAGIC_REPLICATION)
    }

    /// Send a sync frame.
    pub fn sync(timestamp_ns: u64) -> Self {
        Self::Send(Frame::Sync { timestamp_ns })
    }

    /// Send an entry frame.
    ///
    /// # Panics
    ///
    /// Panics if the entry cannot be encoded.
    pub fn entry(timestamp_ns: u64, entry: &LogEntry) -> Self {
        Self::Send(Frame::Entry {
            timestamp_ns,
            payload: entry.encode().expect("entry must encode"),
        })
    }
}

/// What the master observed during the session.
#[derive(Debug, Clone, Default)]
pub struct MasterTranscript {
    /// The decoded handshake request.
    pub handshake: Option<HandshakeRequest>,
    /// Bytes read by [`MasterStep::ExpectPoll`] steps, in order.
    pub polls: Vec<u8>,
    /// Bytes the slave sent after the script finished.
    pub trailing: Vec<u8>,
}

impl MasterTranscript {
    /// Number of well-formed poll bytes received.
    pub fn poll_count(&self) -> usize {
        self.polls.iter().filter(|&&b| b == MAGIC_REPLICATION).count()
    }
}

/// A single-connection scripted master on `127.0.0.1`.
pub struct MockMaster {
    addr: SocketAddr,
    handle: Option<JoinHandle<io::Result<MasterTranscript>>>,
}

impl MockMaster {
    /// Binds an ephemeral port and starts serving `script` in a background
    /// thread.
    pub fn start(script: Vec<MasterStep>) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let handle = std::thread::Builder::new()
            .name(format!("mock-master-{}", addr.port()))
            .spawn(move || serve(listener, script))?;
        Ok(Self {
            addr,
            handle: Some(handle),
        })
    }

    /// Address the master listens on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Port the master listens on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Waits for the session to end and returns what the master observed.
    ///
    /// The session ends when the script hangs up or the slave disconnects,
    /// so drop or close the slave side first.
    pub fn finish(mut self) -> io::Result<MasterTranscript> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "mock master panicked"))?,
            None => Ok(MasterTranscript::default()),
        }
    }
}

fn serve(listener: TcpListener, script: Vec<MasterStep>) -> io::Result<MasterTranscript> {
    let (mut stream, peer) = listener.accept()?;
    stream.set_read_timeout(Some(MASTER_READ_TIMEOUT))?;
    debug!(%peer, "mock master accepted slave");

    let mut transcript = MasterTranscript::default();
    let mut request = [0u8; HANDSHAKE_LEN];
    stream.read_exact(&mut request)?;
    transcript.handshake = HandshakeRequest::decode(&request).ok();

    for step in script {
        match step {
            MasterStep::Respond(byte) => stream.write_all(&[byte])?,
            MasterStep::Send(frame) => {
                let bytes = frame
                    .encode()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                stream.write_all(&bytes)?;
            }
            MasterStep::SendRaw(bytes) => stream.write_all(&bytes)?,
            MasterStep::ExpectPoll => {
                let mut poll = [0u8; 1];
                stream.read_exact(&mut poll)?;
                transcript.polls.push(poll[0]);
            }
            MasterStep::Hangup => {
                stream.flush()?;
                let _ = stream.shutdown(Shutdown::Both);
                return Ok(transcript);
            }
        }
        stream.flush()?;
    }

    // Hold the connection until the slave goes away.
    let mut buf = [0u8; 64];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => transcript.trailing.extend_from_slice(&buf[..n]),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::ConnectionReset => break,
            Err(err) => return Err(err),
        }
    }
    Ok(transcript)
}
