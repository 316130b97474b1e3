//! # Hex Helpers
//!
//! Hex formatting of frames for logs and the CLI, and lenient parsing of
//! captured frames pasted from a serial sniffer.
//!
//! ```rust
//! use mercury_rs::util::hex::{format_hex_compact, parse_hex_lenient};
//!
//! let frame = parse_hex_lenient("0A 98 76 54 63").unwrap();
//! assert_eq!(format_hex_compact(&frame), "0A 98 76 54 63");
//! ```

use crate::error::MeterError;

/// Encode bytes to a contiguous uppercase hex string
pub fn encode_hex_upper(data: &[u8]) -> String {
    hex::encode_upper(data)
}

/// Format data as "0A 98 76 54" with spaces between bytes
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a hex string that may contain spaces, `0x` prefixes or other
/// separators between the bytes.
pub fn parse_hex_lenient(input: &str) -> Result<Vec<u8>, MeterError> {
    let hex_chars: String = input
        .split(|c: char| c.is_whitespace() || c == ',' || c == ':' || c == '-')
        .map(|token| {
            token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token)
        })
        .collect();

    if hex_chars.is_empty() || hex_chars.len() % 2 != 0 {
        return Err(MeterError::InvalidHexString);
    }

    hex::decode(&hex_chars).map_err(|_| MeterError::InvalidHexString)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_compact() {
        assert_eq!(format_hex_compact(&[0x0A, 0x98, 0xE8]), "0A 98 E8");
        assert_eq!(format_hex_compact(&[]), "");
    }

    #[test]
    fn test_encode_upper() {
        assert_eq!(encode_hex_upper(&[0xAB, 0xCD]), "ABCD");
    }

    #[test]
    fn test_parse_lenient() {
        let expected = vec![0x0A, 0x98, 0x76, 0x54];
        assert_eq!(parse_hex_lenient("0A987654").unwrap(), expected);
        assert_eq!(parse_hex_lenient("0a 98 76 54").unwrap(), expected);
        assert_eq!(parse_hex_lenient("0x0A,0x98,0x76,0x54").unwrap(), expected);
        assert_eq!(parse_hex_lenient("0A-98:76 54").unwrap(), expected);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_hex_lenient(""), Err(MeterError::InvalidHexString)));
        assert!(matches!(parse_hex_lenient("0A9"), Err(MeterError::InvalidHexString)));
        assert!(matches!(parse_hex_lenient("GG"), Err(MeterError::InvalidHexString)));
    }
}
