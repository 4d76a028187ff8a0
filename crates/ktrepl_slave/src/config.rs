//! Configuration for the slave client.

use crate::error::{ReplicationError, ReplicationResult};
use std::time::Duration;

/// Default master host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default replication port of a Kyoto Tycoon master.
pub const DEFAULT_PORT: u16 = 1978;

/// Default socket timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a replication slave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveConfig {
    /// Slave id. Must be unique among all slaves of the same master.
    pub slave_id: u16,
    /// Master host.
    pub host: String,
    /// Master replication port.
    pub port: u16,
    /// Connect, read and write timeout.
    pub timeout: Duration,
    /// Flags sent in the handshake. Reserved, zero.
    pub flags: u32,
}

impl SlaveConfig {
    /// Creates a configuration with default host, port and timeout.
    pub fn new(slave_id: u16) -> Self {
        Self {
            slave_id,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            flags: 0,
        }
    }

    /// Creates a configuration from an unchecked slave id.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::InvalidSlaveId`] if `slave_id` is not
    /// within `0..=65535`.
    pub fn try_new(slave_id: i64) -> ReplicationResult<Self> {
        u16::try_from(slave_id)
            .map(Self::new)
            .map_err(|_| ReplicationError::InvalidSlaveId(slave_id))
    }

    /// Sets the master host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the master port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the socket timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the handshake flags.
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Returns `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checks values the type system does not.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::InvalidConfig`] for an empty host or a
    /// zero timeout (a zero socket timeout is rejected by the OS).
    pub fn validate(&self) -> ReplicationResult<()> {
        if self.host.is_empty() {
            return Err(ReplicationError::InvalidConfig("host is empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(ReplicationError::InvalidConfig(
                "timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Reconnection policy for callers that restart a failed session.
///
/// The client never reconnects on its own. A caller that keeps tailing asks
/// [`RetryConfig::next_delay`] after each failed session, sleeps, and resumes
/// with [`consume_from_ns`](crate::ReplicationClient::consume_from_ns) from
/// the stream's last timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Consecutive failed sessions tolerated, including the first.
    pub max_attempts: u32,
    /// Delay before the first reconnect.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub backoff_multiplier: f64,
    /// Stretch each delay by a random amount of up to 25%.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a policy allowing `max_attempts` consecutive failed sessions.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a policy that never reconnects.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the delay before the first reconnect.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Makes delays deterministic.
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Decides whether to reconnect after `failures` consecutive failed
    /// sessions, the latest of which ended with `err`.
    ///
    /// Returns the delay to wait, or `None` to give up. Only connection
    /// errors are worth another session; protocol and configuration errors
    /// would fail the same way again.
    pub fn next_delay(&self, failures: u32, err: &ReplicationError) -> Option<Duration> {
        if !err.is_retryable() || failures >= self.max_attempts {
            return None;
        }
        Some(self.delay_for_attempt(failures))
    }

    /// Backoff delay before reconnect number `attempt` (attempt 0 is the
    /// initial connect and never waits).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let Some(exponent) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };
        let exponent = i32::try_from(exponent).unwrap_or(i32::MAX);
        let secs = (self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay.as_secs_f64());
        let secs = if self.add_jitter {
            secs * (1.0 + 0.25 * jitter_fraction())
        } else {
            secs
        };
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Random value in `[0, 1)` from the std hasher's per-process random keys.
fn jitter_fraction() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::BuildHasher;
    let bits = RandomState::new().hash_one(std::time::Instant::now());
    (bits >> 11) as f64 / (1u64 << 53) as f64
}
