//! Replication log entries.

use crate::error::{CodecError, CodecResult};
use crate::reader::WireReader;
use crate::varnum::{encode_varnum, varnum_len};
use bytes::BufMut;

/// Largest value the 40-bit expiration field can carry.
///
/// The server uses it as the "never expires" sentinel.
pub const XT_MAX: u64 = (1 << 40) - 1;

/// Size of the fixed entry header: source id (2) + database index (2) + op code (1).
const ENTRY_HEADER_SIZE: usize = 5;

/// Size of the expiration field.
const EXPIRE_TIME_SIZE: usize = 5;

/// Operation code of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// A record was stored.
    Set = 0xA1,
    /// A record was removed.
    Remove = 0xA2,
    /// The whole database was cleared.
    Clear = 0xA5,
}

impl OpCode {
    /// Converts a byte to an op code.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0xA1 => Some(Self::Set),
            0xA2 => Some(Self::Remove),
            0xA5 => Some(Self::Clear),
            _ => None,
        }
    }

    /// Converts the op code to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Lowercase name of the operation.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Remove => "remove",
            Self::Clear => "clear",
        }
    }
}

/// The mutation carried by a [`LogEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Store `value` under `key`.
    Set {
        /// Record key.
        key: Vec<u8>,
        /// Record value.
        value: Vec<u8>,
        /// Expiration time, 40 bits. [`XT_MAX`] means never.
        expire_time: u64,
    },
    /// Remove `key`.
    Remove {
        /// Record key.
        key: Vec<u8>,
    },
    /// Remove every record of the database.
    Clear,
}

/// A single replication event.
///
/// Entries are decoded from the payload of a replication frame:
///
/// ```text
/// source_id:u16 | database_index:u16 | op:u8 | [key_len:varnum key]
///               | [value_len:varnum expire_time:u40 value]
/// ```
///
/// The key is present for `Set` and `Remove`, the value and expiration time
/// only for `Set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Replication peer that originated the write.
    pub source_id: u16,
    /// Logical database inside the server.
    pub database_index: u16,
    /// The mutation.
    pub operation: Operation,
}

impl LogEntry {
    /// Creates a `Set` entry.
    pub fn set(
        source_id: u16,
        database_index: u16,
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
        expire_time: u64,
    ) -> Self {
        Self {
            source_id,
            database_index,
            operation: Operation::Set {
                key: key.into(),
                value: value.into(),
                expire_time,
            },
        }
    }

    /// Creates a `Remove` entry.
    pub fn remove(source_id: u16, database_index: u16, key: impl Into<Vec<u8>>) -> Self {
        Self {
            source_id,
            database_index,
            operation: Operation::Remove { key: key.into() },
        }
    }

    /// Creates a `Clear` entry.
    pub fn clear(source_id: u16, database_index: u16) -> Self {
        Self {
            source_id,
            database_index,
            operation: Operation::Clear,
        }
    }

    /// Returns the op code of this entry.
    #[must_use]
    pub fn op_code(&self) -> OpCode {
        match self.operation {
            Operation::Set { .. } => OpCode::Set,
            Operation::Remove { .. } => OpCode::Remove,
            Operation::Clear => OpCode::Clear,
        }
    }

    /// Returns the key, if the operation has one.
    pub fn key(&self) -> Option<&[u8]> {
        match &self.operation {
            Operation::Set { key, .. } | Operation::Remove { key } => Some(key),
            Operation::Clear => None,
        }
    }

    /// Returns the value of a `Set` entry.
    pub fn value(&self) -> Option<&[u8]> {
        match &self.operation {
            Operation::Set { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Returns the expiration time of a `Set` entry, or `None` when the
    /// entry is not a `Set` or never expires.
    pub fn expires_at(&self) -> Option<u64> {
        match self.operation {
            Operation::Set { expire_time, .. } if expire_time < XT_MAX => Some(expire_time),
            _ => None,
        }
    }

    /// Returns the size of the encoded payload in bytes.
    pub fn payload_size(&self) -> usize {
        ENTRY_HEADER_SIZE
            + match &self.operation {
                Operation::Set { key, value, .. } => {
                    varnum_len(key.len() as u64)
                        + key.len()
                        + varnum_len(value.len() as u64)
                        + EXPIRE_TIME_SIZE
                        + value.len()
                }
                Operation::Remove { key } => varnum_len(key.len() as u64) + key.len(),
                Operation::Clear => 0,
            }
    }

    /// Encodes the entry payload.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::ExpireTimeOutOfRange`] if a `Set` expiration
    /// time does not fit in 40 bits.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.payload_size());
        buf.put_u16(self.source_id);
        buf.put_u16(self.database_index);
        buf.put_u8(self.op_code().as_byte());

        match &self.operation {
            Operation::Set {
                key,
                value,
                expire_time,
            } => {
                if *expire_time > XT_MAX {
                    return Err(CodecError::ExpireTimeOutOfRange(*expire_time));
                }
                encode_varnum(key.len() as u64, &mut buf);
                buf.put_slice(key);
                encode_varnum(value.len() as u64, &mut buf);
                buf.put_uint(*expire_time, EXPIRE_TIME_SIZE);
                buf.put_slice(value);
            }
            Operation::Remove { key } => {
                encode_varnum(key.len() as u64, &mut buf);
                buf.put_slice(key);
            }
            Operation::Clear => {}
        }

        Ok(buf)
    }

    /// Decodes an entry payload.
    ///
    /// The payload must contain exactly one entry; leftover bytes mean the
    /// frame length and the entry disagree and the stream is corrupt.
    ///
    /// # Errors
    ///
    /// Returns an error on truncated input, an unknown op code, an
    /// overflowing varnum, or trailing bytes.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut reader = WireReader::new(bytes);
        let source_id = reader.read_u16()?;
        let database_index = reader.read_u16()?;
        let op_byte = reader.read_u8()?;
        let op = OpCode::from_byte(op_byte).ok_or(CodecError::UnknownOpCode(op_byte))?;

        let operation = match op {
            OpCode::Set => {
                let key = reader.read_length_prefixed()?.to_vec();
                // The value length precedes the expiration time, the value
                // bytes follow it.
                let value_len = reader.read_varnum()?;
                let expire_time = reader.read_u40()?;
                let value_len = usize::try_from(value_len).map_err(|_| {
                    CodecError::SizeLimitExceeded {
                        claimed: value_len,
                        max_allowed: usize::MAX as u64,
                    }
                })?;
                let value = reader.read_bytes(value_len)?.to_vec();
                Operation::Set {
                    key,
                    value,
                    expire_time,
                }
            }
            OpCode::Remove => Operation::Remove {
                key: reader.read_length_prefixed()?.to_vec(),
            },
            OpCode::Clear => Operation::Clear,
        };

        reader.finish()?;

        Ok(Self {
            source_id,
            database_index,
            operation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_codes() {
        assert_eq!(OpCode::Set.as_byte(), 0xA1);
        assert_eq!(OpCode::Remove.as_byte(), 0xA2);
        assert_eq!(OpCode::Clear.as_byte(), 0xA5);

        assert_eq!(OpCode::from_byte(0xA1), Some(OpCode::Set));
        assert_eq!(OpCode::from_byte(0xA2), Some(OpCode::Remove));
        assert_eq!(OpCode::from_byte(0xA5), Some(OpCode::Clear));
        assert_eq!(OpCode::from_byte(0xA3), None);
    }

    #[test]
    fn set_wire_layout() {
        let entry = LogEntry::set(7, 0, b"foo".to_vec(), b"bar".to_vec(), 0);
        let bytes = entry.encode().unwrap();
        assert_eq!(
            bytes,
            vec![
                0x00, 0x07, // source id
                0x00, 0x00, // database index
                0xA1, // set
                0x03, b'f', b'o', b'o', // key
                0x03, // value length
                0x00, 0x00, 0x00, 0x00, 0x00, // expire time
                b'b', b'a', b'r', // value
            ]
        );
        assert_eq!(bytes.len(), entry.payload_size());
        assert_eq!(LogEntry::decode(&bytes).unwrap(), entry);
    }

    #[test]
    fn remove_roundtrip() {
        let entry = LogEntry::remove(3, 2, b"gone".to_vec());
        let bytes = entry.encode().unwrap();
        assert_eq!(&bytes[..5], &[0x00, 0x03, 0x00, 0x02, 0xA2]);
        let decoded = LogEntry::decode(&bytes).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.key(), Some(&b"gone"[..]));
        assert_eq!(decoded.value(), None);
        assert_eq!(decoded.expires_at(), None);
    }

    #[test]
    fn clear_has_no_body() {
        let entry = LogEntry::clear(1, 4);
        let bytes = entry.encode().unwrap();
        assert_eq!(bytes, vec![0x00, 0x01, 0x00, 0x04, 0xA5]);
        let decoded = LogEntry::decode(&bytes).unwrap();
        assert_eq!(decoded.operation, Operation::Clear);
        assert_eq!(decoded.key(), None);
    }

    #[test]
    fn expire_time_is_forty_bits() {
        let entry = LogEntry::set(1, 0, b"k".to_vec(), b"v".to_vec(), XT_MAX);
        let bytes = entry.encode().unwrap();
        assert_eq!(&bytes[8..13], &[0xff; 5]);
        let decoded = LogEntry::decode(&bytes).unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(decoded.expires_at(), None);

        let soon = LogEntry::set(1, 0, b"k".to_vec(), b"v".to_vec(), 1_700_000_000);
        assert_eq!(soon.expires_at(), Some(1_700_000_000));

        let too_big = LogEntry::set(1, 0, b"k".to_vec(), b"v".to_vec(), XT_MAX + 1);
        assert_eq!(
            too_big.encode(),
            Err(CodecError::ExpireTimeOutOfRange(XT_MAX + 1))
        );
    }

    #[test]
    fn large_key_uses_multibyte_varnum() {
        let key = vec![b'k'; 300];
        let entry = LogEntry::remove(1, 0, key);
        let bytes = entry.encode().unwrap();
        assert_eq!(&bytes[5..7], &[0x82, 0x2c]);
        assert_eq!(LogEntry::decode(&bytes).unwrap(), entry);
    }

    #[test]
    fn reject_unknown_op_code() {
        assert_eq!(
            LogEntry::decode(&[0x00, 0x01, 0x00, 0x00, 0xA3]),
            Err(CodecError::UnknownOpCode(0xA3))
        );
    }

    #[test]
    fn reject_trailing_bytes() {
        let mut bytes = LogEntry::clear(1, 0).encode().unwrap();
        bytes.extend_from_slice(&[0xA1, 0x00]);
        assert_eq!(
            LogEntry::decode(&bytes),
            Err(CodecError::TrailingBytes { remaining: 2 })
        );
    }

    #[test]
    fn reject_truncated_payload() {
        let bytes = LogEntry::set(1, 0, b"key".to_vec(), b"value".to_vec(), 9)
            .encode()
            .unwrap();
        for cut in 0..bytes.len() {
            assert!(
                matches!(
                    LogEntry::decode(&bytes[..cut]),
                    Err(CodecError::UnexpectedEof { .. })
                ),
                "cut at {cut}"
            );
        }
    }
}
