//! Wire format: the two framing disciplines.
//!
//! ```text
//! length-prefixed:  <decimal length> '|' <payload bytes>      e.g. 5|"abc"
//! newline:          <payload text> '\n'                      e.g. "abc"\n
//! ```
//!
//! The length is ASCII decimal digits, no sign, and counts payload bytes.
//! Nothing follows the payload of a length-prefixed frame; the next prefix
//! starts immediately.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RpcError, Result};

/// Separator between the decimal length and the payload.
pub const LENGTH_SEPARATOR: u8 = b'|';

/// Terminator of a newline-delimited frame.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Maximum significant digits in a length prefix (`u64::MAX` has 20).
///
/// Leading zeros are not counted.
pub const MAX_PREFIX_DIGITS: usize = 20;

/// Default maximum payload size (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Framing discipline, fixed for the lifetime of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
    /// `<decimalLength>|<payload>`.
    LengthPrefixed,
    /// `<payload>\n`.
    #[default]
    Newline,
}

impl Framing {
    /// Kebab-case name, as accepted by `FromStr`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Framing::LengthPrefixed => "length-prefixed",
            Framing::Newline => "newline",
        }
    }

    /// Bytes written before a payload of `payload_len` bytes.
    pub fn encode_head(&self, payload_len: usize) -> Vec<u8> {
        match self {
            Framing::LengthPrefixed => {
                let mut head = payload_len.to_string().into_bytes();
                head.push(LENGTH_SEPARATOR);
                head
            }
            Framing::Newline => Vec::new(),
        }
    }

    /// Bytes written after a payload.
    pub fn tail(&self) -> &'static [u8] {
        match self {
            Framing::LengthPrefixed => b"",
            Framing::Newline => b"\n",
        }
    }

    /// Check that a payload can be carried by this framing.
    ///
    /// A newline-delimited payload must not contain `\n`.
    pub fn validate_payload(&self, payload: &[u8]) -> Result<()> {
        if *self == Framing::Newline && payload.contains(&LINE_TERMINATOR) {
            return Err(RpcError::Protocol(
                "payload contains a newline and cannot be newline-framed".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Framing {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "length-prefixed" => Ok(Framing::LengthPrefixed),
            "newline" => Ok(Framing::Newline),
            other => Err(RpcError::Config(format!("unknown framing: {other}"))),
        }
    }
}

/// Parse a complete length prefix (the bytes before `|`).
///
/// # Errors
///
/// `FrameSync` if the prefix is empty, has a non-digit byte, or overflows.
pub fn parse_length_prefix(prefix: &[u8]) -> Result<usize> {
    check_prefix_digits(prefix)?;
    if prefix.is_empty() {
        return Err(RpcError::FrameSync("empty length prefix".to_string()));
    }

    // All ASCII digits, so the slice is valid UTF-8.
    let text = std::str::from_utf8(prefix)
        .map_err(|_| RpcError::FrameSync("length prefix is not ASCII".to_string()))?;
    text.parse::<usize>()
        .map_err(|_| RpcError::FrameSync(format!("length prefix out of range: {text}")))
}

/// Validate a possibly incomplete length prefix.
///
/// Used while the separator has not arrived yet, so garbage is rejected
/// without waiting for more input.
pub fn check_prefix_digits(prefix: &[u8]) -> Result<()> {
    if let Some(&bad) = prefix.iter().find(|b| !b.is_ascii_digit()) {
        return Err(RpcError::FrameSync(format!(
            "invalid byte 0x{bad:02x} in length prefix"
        )));
    }
    let significant = prefix.iter().skip_while(|&&b| b == b'0').count();
    if significant > MAX_PREFIX_DIGITS {
        return Err(RpcError::FrameSync(format!(
            "length prefix has more than {MAX_PREFIX_DIGITS} significant digits"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_length_prefix() {
        assert_eq!(parse_length_prefix(b"0").unwrap(), 0);
        assert_eq!(parse_length_prefix(b"5").unwrap(), 5);
        assert_eq!(parse_length_prefix(b"00042").unwrap(), 42);
    }

    #[test]
    fn test_parse_length_prefix_rejects_garbage() {
        for bad in [&b""[..], b"-1", b"+3", b"1a", b" 4", b"abc"] {
            let err = parse_length_prefix(bad).unwrap_err();
            assert!(matches!(err, RpcError::FrameSync(_)), "{bad:?}");
        }
    }

    #[test]
    fn test_parse_length_prefix_overflow() {
        let err = parse_length_prefix(b"99999999999999999999").unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_check_prefix_digits_partial() {
        assert!(check_prefix_digits(b"").is_ok());
        assert!(check_prefix_digits(b"12").is_ok());
        assert!(check_prefix_digits(b"1{").is_err());
        assert!(check_prefix_digits(&[b'1'; MAX_PREFIX_DIGITS + 1]).is_err());
    }

    #[test]
    fn test_leading_zeros_do_not_count_toward_prefix_limit() {
        let mut prefix = vec![b'0'; MAX_PREFIX_DIGITS];
        prefix.push(b'5');
        assert!(check_prefix_digits(&prefix).is_ok());
        assert_eq!(parse_length_prefix(&prefix).unwrap(), 5);
    }

    #[test]
    fn test_encode_head_and_tail() {
        assert_eq!(Framing::LengthPrefixed.encode_head(5), b"5|");
        assert_eq!(Framing::LengthPrefixed.encode_head(0), b"0|");
        assert!(Framing::LengthPrefixed.tail().is_empty());

        assert!(Framing::Newline.encode_head(5).is_empty());
        assert_eq!(Framing::Newline.tail(), b"\n");
    }

    #[test]
    fn test_validate_payload() {
        assert!(Framing::Newline.validate_payload(b"{\"a\":1}").is_ok());
        assert!(Framing::Newline.validate_payload(b"a\nb").is_err());
        assert!(Framing::LengthPrefixed.validate_payload(b"a\nb").is_ok());
    }

    #[test]
    fn test_framing_from_str() {
        assert_eq!(
            "length-prefixed".parse::<Framing>().unwrap(),
            Framing::LengthPrefixed
        );
        assert_eq!("newline".parse::<Framing>().unwrap(), Framing::Newline);
        assert!("carrier-pigeon".parse::<Framing>().is_err());
        assert!("line".parse::<Framing>().is_err());
        assert_eq!(Framing::LengthPrefixed.to_string(), "length-prefixed");
    }

    #[test]
    fn test_framing_serde_names() {
        let json = serde_json::to_string(&Framing::LengthPrefixed).unwrap();
        assert_eq!(json, "\"length-prefixed\"");
        let back: Framing = serde_json::from_str("\"newline\"").unwrap();
        assert_eq!(back, Framing::Newline);
    }
}
