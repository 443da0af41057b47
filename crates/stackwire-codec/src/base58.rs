//! Base58 UID helpers.
//!
//! Device UIDs travel inside enumeration payloads as fixed-width base58
//! text. The alphabet omits `0`, `O`, `l` and `I` to keep transcription
//! unambiguous.

use crate::error::{CodecError, Result};

const ALPHABET: &[u8; 58] = b"123456789abcdefghijkmnopqrstuvwxyzABCDEFGHJKLMNPQRSTUVWXYZ";

/// Decode a base58 string into its numeric value.
pub fn decode(text: &str) -> Result<u64> {
    let mut value: u64 = 0;
    for ch in text.chars() {
        let digit = ALPHABET
            .iter()
            .position(|&c| c as char == ch)
            .ok_or(CodecError::InvalidBase58(ch))? as u64;
        value = value
            .checked_mul(58)
            .and_then(|v| v.checked_add(digit))
            .ok_or(CodecError::Base58Overflow)?;
    }
    Ok(value)
}

/// Decode a base58 UID, requiring it to fit the 32-bit wire address.
pub fn uid_from_base58(text: &str) -> Result<u32> {
    u32::try_from(decode(text)?).map_err(|_| CodecError::Base58Overflow)
}

/// Encode a numeric value as base58 text.
pub fn encode(mut value: u64) -> String {
    if value == 0 {
        return (ALPHABET[0] as char).to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 58) as usize]);
        value /= 58;
    }
    digits.reverse();
    // ALPHABET bytes are ASCII.
    String::from_utf8(digits).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        for value in [0u64, 1, 57, 58, 1_234_567, u32::MAX as u64, u64::MAX] {
            assert_eq!(decode(&encode(value)).unwrap(), value);
        }
    }

    #[test]
    fn single_digits() {
        assert_eq!(decode("1").unwrap(), 0);
        assert_eq!(decode("2").unwrap(), 1);
        assert_eq!(decode("Z").unwrap(), 57);
    }

    #[test]
    fn invalid_digit() {
        assert!(matches!(decode("ab0"), Err(CodecError::InvalidBase58('0'))));
        assert!(matches!(decode("O"), Err(CodecError::InvalidBase58('O'))));
    }

    #[test]
    fn overflow() {
        assert!(matches!(
            decode("ZZZZZZZZZZZZ"),
            Err(CodecError::Base58Overflow)
        ));
    }

    #[test]
    fn uid_must_fit_32_bits() {
        let wide = encode(u64::from(u32::MAX) + 1);
        assert!(matches!(
            uid_from_base58(&wide),
            Err(CodecError::Base58Overflow)
        ));
        assert_eq!(uid_from_base58(&encode(42)).unwrap(), 42);
    }
}
