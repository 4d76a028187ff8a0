//! Tail command implementation.

use super::output::{write_entry, EntryInfo, OutputFormat};
use super::CliError;
use ktrepl_slave::{to_timestamp_ns, Connector, ReplicationClient, RetryConfig};
use std::io::Write;
use std::time::SystemTime;
use tracing::{info, warn};

/// Options for the tail command.
#[derive(Debug, Clone)]
pub struct TailOptions {
    /// Start timestamp; `None` starts from now.
    pub since_ns: Option<u64>,
    /// Stop after this many entries.
    pub limit: Option<usize>,
    /// Output format.
    pub format: OutputFormat,
    /// Reconnection policy after connection failures.
    pub retry: RetryConfig,
}

/// Runs the tail command and returns the number of entries printed.
///
/// Without `since_ns` the start point is fixed to the current time once,
/// before the first connect. Connection failures are retried according to
/// `options.retry`, resuming from the timestamp of the last frame seen or
/// from that start point. An entry carrying that exact timestamp may be
/// printed twice. Protocol errors are never retried.
pub fn run<K: Connector>(
    client: &ReplicationClient<K>,
    options: &TailOptions,
    out: &mut impl Write,
) -> Result<usize, CliError> {
    let limit = options.limit.unwrap_or(usize::MAX);
    let mut printed = 0;
    let mut resume_ns = options
        .since_ns
        .unwrap_or_else(|| to_timestamp_ns(SystemTime::now()));
    let mut failures = 0u32;

    while printed < limit {
        let before = printed;
        match follow(client, &mut resume_ns, limit, &mut printed, options.format, out) {
            Ok(()) => break,
            Err(CliError::Replication(err)) => {
                if printed > before {
                    failures = 0;
                }
                failures += 1;
                let Some(delay) = options.retry.next_delay(failures, &err) else {
                    return Err(err.into());
                };
                warn!(error = %err, attempt = failures, ?delay, resume_ns, "reconnecting");
                std::thread::sleep(delay);
            }
            Err(err) => return Err(err),
        }
    }

    Ok(printed)
}

/// Follows one session until the limit is reached or the stream ends.
fn follow<K: Connector>(
    client: &ReplicationClient<K>,
    resume_ns: &mut u64,
    limit: usize,
    printed: &mut usize,
    format: OutputFormat,
    out: &mut impl Write,
) -> Result<(), CliError> {
    let mut stream = client.consume_from_ns(*resume_ns)?;
    info!(address = %client.config().address(), since_ns = *resume_ns, "tailing replication log");

    while *printed < limit {
        let next = stream.next();
        if let Some(ts) = stream.last_timestamp() {
            *resume_ns = ts;
        }
        match next {
            None => return Ok(()),
            Some(Err(err)) => return Err(err.into()),
            Some(Ok(entry)) => {
                write_entry(out, &EntryInfo::new(&entry, stream.last_timestamp()), format)?;
                out.flush()?;
                *printed += 1;
            }
        }
    }
    Ok(())
}
