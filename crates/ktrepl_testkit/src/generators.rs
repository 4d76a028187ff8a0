//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random wire data that respects the
//! protocol's field ranges.

use ktrepl_codec::{LogEntry, Operation, XT_MAX};
use proptest::prelude::*;

/// Strategy for generating record keys.
pub fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..300)
}

/// Strategy for generating record values.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

/// Strategy for generating 40-bit expiration times, biased towards the
/// edges.
pub fn expire_time_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![
        1 => Just(0u64),
        1 => Just(XT_MAX),
        6 => 0..=XT_MAX,
    ]
}

/// Strategy for generating varnum inputs up to 2^40, including the values
/// around every 7-bit group boundary.
pub fn varnum_value_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![
        (1u32..=5).prop_flat_map(|groups| {
            let edge = 1u64 << (7 * groups);
            prop_oneof![Just(edge - 1), Just(edge), Just(edge + 1)]
        }),
        0u64..=(1u64 << 40),
    ]
}

/// Strategy for generating operations.
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        4 => (key_strategy(), value_strategy(), expire_time_strategy()).prop_map(
            |(key, value, expire_time)| Operation::Set {
                key,
                value,
                expire_time,
            }
        ),
        2 => key_strategy().prop_map(|key| Operation::Remove { key }),
        1 => Just(Operation::Clear),
    ]
}

/// Strategy for generating well-formed log entries.
pub fn log_entry_strategy() -> impl Strategy<Value = LogEntry> {
    (any::<u16>(), any::<u16>(), operation_strategy()).prop_map(
        |(source_id, database_index, operation)| LogEntry {
            source_id,
            database_index,
            operation,
        },
    )
}

/// Strategy for generating log entries that never originate from
/// `slave_id`.
pub fn foreign_entry_strategy(slave_id: u16) -> impl Strategy<Value = LogEntry> {
    log_entry_strategy().prop_filter("entry must not originate from the slave", move |e| {
        e.source_id != slave_id
    })
}

/// Cases per property for pure codec properties.
pub const CODEC_CASES: u32 = 256;

/// Cases per property for properties that drive a whole session.
pub const SESSION_CASES: u32 = 32;

/// Proptest configuration running `cases` cases, shrinking for at most
/// four steps per case.
#[must_use]
pub fn proptest_config(cases: u32) -> ProptestConfig {
    ProptestConfig {
        cases,
        max_shrink_iters: cases.saturating_mul(4),
        ..ProptestConfig::default()
    }
}
