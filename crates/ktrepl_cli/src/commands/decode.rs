//! Decode command implementation.

use super::output::{EntryInfo, OutputFormat};
use super::CliError;
use ktrepl_codec::{from_hex, LogEntry};
use std::io::Write;

/// Runs the decode command.
///
/// `hex` is a single entry payload as carried inside an entry frame.
/// Whitespace between digits is ignored.
pub fn run(hex: &str, format: OutputFormat, out: &mut impl Write) -> Result<(), CliError> {
    let bytes = from_hex(hex).map_err(|err| CliError::InvalidArgument(err.to_string()))?;
    let entry = LogEntry::decode(&bytes)?;
    let info = EntryInfo::new(&entry, None);

    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&info)?)?,
        OutputFormat::Text => {
            super::output::write_entry(out, &info, format)?;
            writeln!(out, "payload={} bytes", bytes.len())?;
        }
    }
    Ok(())
}
