//! Hex text form of wire bytes, for tooling and test vectors.

use crate::error::{CodecError, CodecResult};

/// Encodes bytes as lowercase hex.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Decodes a hex string. ASCII whitespace between digits is ignored.
///
/// # Errors
///
/// Returns [`CodecError::InvalidStructure`] for an odd number of digits or
/// a character that is not a hex digit.
pub fn from_hex(hex: &str) -> CodecResult<Vec<u8>> {
    let digits: Vec<char> = hex.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(CodecError::invalid_structure(
            "hex input has an odd number of digits",
        ));
    }
    digits
        .chunks(2)
        .map(|pair| match (pair[0].to_digit(16), pair[1].to_digit(16)) {
            (Some(hi), Some(lo)) => Ok((hi * 16 + lo) as u8),
            _ => Err(CodecError::invalid_structure(format!(
                "invalid hex digits '{}{}'",
                pair[0], pair[1]
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        assert_eq!(to_hex(&[0x00, 0xab, 0xff]), "00abff");
        assert_eq!(from_hex("00 ab\nFF").unwrap(), vec![0x00, 0xab, 0xff]);
        assert_eq!(from_hex("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(matches!(
            from_hex("abc"),
            Err(CodecError::InvalidStructure { .. })
        ));
        let err = from_hex("zz").unwrap_err();
        assert!(err.to_string().contains("'zz'"));
    }
}
