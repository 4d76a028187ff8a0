//! Entry rendering shared by `tail` and `decode`.

use super::CliError;
use ktrepl_codec::{LogEntry, Operation, XT_MAX};
use serde::Serialize;
use std::io::Write;
use std::str::FromStr;

/// Output format selected with `--format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One human-readable line per entry.
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for OutputFormat {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CliError::InvalidArgument(format!(
                "unknown format '{other}' (expected text or json)"
            ))),
        }
    }
}

/// Log entry representation for output.
///
/// Keys and values are rendered with ASCII escapes, so binary data stays
/// readable and unambiguous.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Frame timestamp (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ns: Option<u64>,
    /// Server id that produced the entry.
    pub source_id: u16,
    /// Target database index.
    pub database_index: u16,
    /// Operation name.
    pub operation: &'static str,
    /// Record key (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Record value (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Expiration time in seconds (if applicable).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_time: Option<u64>,
}

impl EntryInfo {
    /// Builds the output view of `entry`.
    pub fn new(entry: &LogEntry, timestamp_ns: Option<u64>) -> Self {
        let (key, value, expire_time) = match &entry.operation {
            Operation::Set {
                key,
                value,
                expire_time,
            } => (Some(escape(key)), Some(escape(value)), Some(*expire_time)),
            Operation::Remove { key } => (Some(escape(key)), None, None),
            Operation::Clear => (None, None, None),
        };
        Self {
            timestamp_ns,
            source_id: entry.source_id,
            database_index: entry.database_index,
            operation: entry.op_code().name(),
            key,
            value,
            expire_time,
        }
    }

    fn to_text(&self) -> String {
        let mut line = String::new();
        if let Some(ts) = self.timestamp_ns {
            line.push_str(&format!("[{ts}] "));
        }
        line.push_str(&format!(
            "src={} db={} {:6}",
            self.source_id, self.database_index, self.operation
        ));
        if let Some(key) = &self.key {
            line.push_str(&format!(" key=\"{key}\""));
        }
        if let Some(value) = &self.value {
            line.push_str(&format!(" value=\"{value}\""));
        }
        match self.expire_time {
            Some(XT_MAX) => line.push_str(" xt=never"),
            Some(xt) => line.push_str(&format!(" xt={xt}")),
            None => {}
        }
        line.trim_end().to_string()
    }
}

/// Writes one entry in the requested format, followed by a newline.
pub fn write_entry(
    out: &mut impl Write,
    info: &EntryInfo,
    format: OutputFormat,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(info)?)?,
        OutputFormat::Text => writeln!(out, "{}", info.to_text())?,
    }
    Ok(())
}

fn escape(bytes: &[u8]) -> String {
    bytes.escape_ascii().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_format() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn text_line_for_set() {
        let entry = LogEntry::set(7, 0, b"foo".to_vec(), b"b\x00r".to_vec(), XT_MAX);
        let mut out = Vec::new();
        write_entry(&mut out, &EntryInfo::new(&entry, Some(12)), OutputFormat::Text).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[12] src=7 db=0 set    key=\"foo\" value=\"b\\x00r\" xt=never\n"
        );
    }

    #[test]
    fn text_line_for_clear() {
        let mut out = Vec::new();
        write_entry(
            &mut out,
            &EntryInfo::new(&LogEntry::clear(3, 1), None),
            OutputFormat::Text,
        )
        .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "src=3 db=1 clear\n");
    }

    #[test]
    fn json_skips_absent_fields() {
        let entry = LogEntry::remove(2, 5, b"k".to_vec());
        let mut out = Vec::new();
        write_entry(&mut out, &EntryInfo::new(&entry, Some(9)), OutputFormat::Json).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["timestamp_ns"], 9);
        assert_eq!(value["operation"], "remove");
        assert_eq!(value["key"], "k");
        assert!(value.get("value").is_none());
        assert!(value.get("expire_time").is_none());
    }
}
