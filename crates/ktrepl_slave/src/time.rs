//! Conversions between wall-clock time and wire timestamps.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Converts a point in time to nanoseconds since the Unix epoch.
///
/// Times before the epoch clamp to 0, times past year 2554 to `u64::MAX`.
pub fn to_timestamp_ns(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Converts nanoseconds since the Unix epoch to a point in time.
pub fn from_timestamp_ns(ns: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_nanos(ns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_conversions() {
        assert_eq!(to_timestamp_ns(UNIX_EPOCH), 0);
        assert_eq!(to_timestamp_ns(UNIX_EPOCH - Duration::from_secs(1)), 0);

        let t = UNIX_EPOCH + Duration::new(1_700_000_000, 123);
        assert_eq!(to_timestamp_ns(t), 1_700_000_000_000_000_123);
        assert_eq!(from_timestamp_ns(to_timestamp_ns(t)), t);
    }
}
