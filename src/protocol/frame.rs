//! Frame struct and outgoing frame construction.
//!
//! A frame carries exactly one JSON payload. Incoming frames keep their
//! payload as `bytes::Bytes` split off the read buffer, so no copy is made
//! between extraction and decoding.
//!
//! # Example
//!
//! ```
//! use pipe_rpc::protocol::{build_frame, Framing};
//!
//! let bytes = build_frame(Framing::LengthPrefixed, br#""abc""#).unwrap();
//! assert_eq!(bytes, br#"5|"abc""#);
//!
//! let bytes = build_frame(Framing::Newline, br#""abc""#).unwrap();
//! assert_eq!(bytes, b"\"abc\"\n");
//! ```

use bytes::Bytes;

use super::wire_format::Framing;
use crate::error::Result;

/// A complete frame extracted from the input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Payload bytes, without prefix or terminator.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame from its payload.
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Create a frame from raw bytes (copies data).
    pub fn from_slice(payload: &[u8]) -> Self {
        Self {
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Build a complete outgoing frame as a single byte vector.
///
/// # Errors
///
/// Fails if the payload cannot be carried by `framing` (a newline inside a
/// newline-delimited payload).
pub fn build_frame(framing: Framing, payload: &[u8]) -> Result<Vec<u8>> {
    framing.validate_payload(payload)?;

    let head = framing.encode_head(payload.len());
    let tail = framing.tail();
    let mut buf = Vec::with_capacity(head.len() + payload.len() + tail.len());
    buf.extend_from_slice(&head);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(tail);
    Ok(buf)
}
