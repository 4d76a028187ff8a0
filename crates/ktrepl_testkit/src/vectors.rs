//! Golden wire vectors.
//!
//! Hex-encoded payloads with their expected decoding, so the codec can be
//! checked against byte sequences captured from a real master.

use ktrepl_codec::from_hex;
use serde::{Deserialize, Serialize};

/// A wire test vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Input data (hex-encoded).
    pub input_hex: String,
    /// Expected error message fragment (if this should fail).
    pub expected_error: Option<String>,
}

impl TestVector {
    fn ok(id: &str, description: &str, input_hex: &str) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            input_hex: input_hex.into(),
            expected_error: None,
        }
    }

    fn err(id: &str, description: &str, input_hex: &str, error: &str) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            input_hex: input_hex.into(),
            expected_error: Some(error.into()),
        }
    }

    /// Decodes `input_hex`.
    ///
    /// # Panics
    ///
    /// Panics if the vector is not valid hex.
    pub fn input(&self) -> Vec<u8> {
        from_hex(&self.input_hex).expect("test vector must be valid hex")
    }
}

/// Entry payload vectors.
pub fn entry_vectors() -> Vec<TestVector> {
    vec![
        TestVector::ok(
            "set_foo_bar",
            "source 7, db 0, set foo=bar, expire 0",
            "00070000a103666f6f030000000000626172",
        ),
        TestVector::ok(
            "set_never_expires",
            "source 1, db 2, set k=v, expire XT_MAX",
            "00010002a1016b01ffffffffff76",
        ),
        TestVector::ok(
            "remove_key",
            "source 3, db 1, remove key",
            "00030001a2036b6579",
        ),
        TestVector::ok("clear_db", "source 5, db 4, clear", "00050004a5"),
        TestVector::ok(
            "remove_empty_key",
            "remove with a zero-length key",
            "00010000a200",
        ),
        TestVector::err(
            "unknown_op",
            "op code 0xa3 is not a log operation",
            "00010000a3",
            "unknown operation code",
        ),
        TestVector::err(
            "clear_with_trailing",
            "clear followed by stray bytes",
            "00010000a50000",
            "trailing bytes",
        ),
        TestVector::err(
            "truncated_key",
            "key length exceeds payload",
            "00010000a2056b",
            "unexpected end of input",
        ),
        TestVector::err(
            "truncated_header",
            "payload shorter than the fixed header",
            "000100",
            "unexpected end of input",
        ),
    ]
}

/// Stream frame vectors (server to slave).
pub fn frame_vectors() -> Vec<TestVector> {
    vec![
        TestVector::ok("sync_frame", "sync at t=1", "b00000000000000001"),
        TestVector::ok(
            "entry_frame_clear",
            "entry frame at t=2 carrying clear(5, 4)",
            "b1000000000000000200000005\
             00050004a5",
        ),
    ]
}

/// Serializes all vectors as pretty JSON, for sharing with other
/// implementations.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn vectors_json() -> serde_json::Result<String> {
    let mut all = entry_vectors();
    all.extend(frame_vectors());
    serde_json::to_string_pretty(&all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ktrepl_codec::{to_hex, Frame, LogEntry, XT_MAX};

    #[test]
    fn entry_vectors_decode_as_expected() {
        for vector in entry_vectors() {
            let result = LogEntry::decode(&vector.input());
            match &vector.expected_error {
                None => {
                    let entry = result.unwrap_or_else(|e| panic!("{}: {e}", vector.id));
                    assert_eq!(
                        to_hex(&entry.encode().unwrap()),
                        vector.input_hex,
                        "{}",
                        vector.id
                    );
                }
                Some(fragment) => {
                    let err = result.expect_err(&vector.id);
                    assert!(
                        err.to_string().contains(fragment.as_str()),
                        "{}: {err}",
                        vector.id
                    );
                }
            }
        }
    }

    #[test]
    fn known_vector_contents() {
        let set = LogEntry::decode(&from_hex("00070000a103666f6f030000000000626172").unwrap())
            .unwrap();
        assert_eq!(set, LogEntry::set(7, 0, b"foo".to_vec(), b"bar".to_vec(), 0));

        let never = LogEntry::decode(&from_hex("00010002a1016b01ffffffffff76").unwrap()).unwrap();
        assert_eq!(never, LogEntry::set(1, 2, b"k".to_vec(), b"v".to_vec(), XT_MAX));
    }

    #[test]
    fn frame_vectors_match_encoder() {
        let vectors = frame_vectors();
        assert_eq!(
            vectors[0].input(),
            Frame::Sync { timestamp_ns: 1 }.encode().unwrap()
        );
        let entry = Frame::Entry {
            timestamp_ns: 2,
            payload: LogEntry::clear(5, 4).encode().unwrap(),
        };
        assert_eq!(vectors[1].input(), entry.encode().unwrap());
    }

    #[test]
    fn vectors_serialize() {
        let json = vectors_json().unwrap();
        let parsed: Vec<TestVector> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), entry_vectors().len() + frame_vectors().len());
    }
}
