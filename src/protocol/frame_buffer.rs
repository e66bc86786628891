//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` so extracted payloads are split off without
//! copying. Length-prefixed framing runs a small state machine:
//! - `WaitingForPrefix`: scanning for the `|` that ends the decimal length
//! - `WaitingForPayload`: length known, need that many payload bytes
//!
//! Newline framing only ever scans for the next `\n`.
//!
//! # Example
//!
//! ```
//! use pipe_rpc::protocol::{FrameBuffer, Framing};
//!
//! let mut buffer = FrameBuffer::new(Framing::LengthPrefixed);
//!
//! // Data arrives in arbitrary chunks from the pipe
//! assert!(buffer.push(b"5|\"a").unwrap().is_empty());
//! let frames = buffer.push(b"bc\"2|{}").unwrap();
//!
//! assert_eq!(frames.len(), 2);
//! assert_eq!(frames[0].payload(), b"\"abc\"");
//! assert_eq!(frames[1].payload(), b"{}");
//! ```

use bytes::BytesMut;

use super::wire_format::{
    check_prefix_digits, parse_length_prefix, Framing, DEFAULT_MAX_PAYLOAD_SIZE,
    LENGTH_SEPARATOR, LINE_TERMINATOR,
};
use super::Frame;
use crate::error::{RpcError, Result};

/// Length-prefix parsing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No expected length; looking for the separator.
    WaitingForPrefix,
    /// Prefix consumed, waiting for `expected` payload bytes.
    WaitingForPayload { expected: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
///
/// One buffer per input stream. Bytes that do not yet form a complete frame
/// stay buffered across calls to [`push`](FrameBuffer::push).
pub struct FrameBuffer {
    /// Accumulated bytes from pipe reads.
    buffer: BytesMut,
    /// Framing discipline of this stream.
    framing: Framing,
    /// Current length-prefix state (unused for newline framing).
    state: State,
    /// Maximum allowed payload size.
    max_payload_size: usize,
    /// Bytes at the front of `buffer` already searched for a delimiter.
    scanned: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max payload: 64MB.
    pub fn new(framing: Framing) -> Self {
        Self::with_max_payload(framing, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a new frame buffer with custom max payload size.
    pub fn with_max_payload(framing: Framing, max_payload_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            framing,
            state: State::WaitingForPrefix,
            max_payload_size,
            scanned: 0,
        }
    }

    /// The framing discipline this buffer extracts.
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Returns frames in byte order. A trailing partial frame is kept for the
    /// next push.
    ///
    /// # Errors
    ///
    /// `FrameSync` if a length prefix is malformed or a declared/accumulated
    /// payload exceeds the maximum size. The stream cannot be resynchronized
    /// after this.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.extend(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame()? {
            frames.push(frame);
        }

        Ok(frames)
    }

    /// Append bytes without extracting anything.
    ///
    /// Pair with [`next_frame`](Self::next_frame) to act on each frame before
    /// a later framing violation in the same chunk is seen.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract a single frame from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` on a framing violation
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.framing {
            Framing::LengthPrefixed => self.extract_length_prefixed(),
            Framing::Newline => self.extract_line(),
        }
    }

    fn extract_length_prefixed(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::WaitingForPrefix => {
                    let Some(pos) = self.find_from_cursor(LENGTH_SEPARATOR) else {
                        // Reject garbage now rather than buffering it forever.
                        check_prefix_digits(&self.buffer)?;
                        self.scanned = self.buffer.len();
                        return Ok(None);
                    };

                    let expected = parse_length_prefix(&self.buffer[..pos])?;
                    if expected > self.max_payload_size {
                        return Err(RpcError::FrameSync(format!(
                            "payload size {} exceeds maximum {}",
                            expected, self.max_payload_size
                        )));
                    }

                    // Consume prefix and separator
                    let _ = self.buffer.split_to(pos + 1);
                    self.scanned = 0;
                    self.state = State::WaitingForPayload { expected };
                }

                State::WaitingForPayload { expected } => {
                    if self.buffer.len() < expected {
                        return Ok(None);
                    }

                    let payload = self.buffer.split_to(expected).freeze();
                    self.state = State::WaitingForPrefix;
                    return Ok(Some(Frame::new(payload)));
                }
            }
        }
    }

    fn extract_line(&mut self) -> Result<Option<Frame>> {
        let pos = self.find_from_cursor(LINE_TERMINATOR);

        // Line length so far, terminated or not; both must obey the limit.
        let line_len = pos.unwrap_or(self.buffer.len());
        if line_len > self.max_payload_size {
            return Err(RpcError::FrameSync(format!(
                "line exceeds maximum payload size {}",
                self.max_payload_size
            )));
        }

        let Some(pos) = pos else {
            self.scanned = self.buffer.len();
            return Ok(None);
        };

        let payload = self.buffer.split_to(pos).freeze();
        // Drop the terminator
        let _ = self.buffer.split_to(1);
        self.scanned = 0;
        Ok(Some(Frame::new(payload)))
    }

    /// Position of `delimiter` in the buffer, skipping already-scanned bytes.
    fn find_from_cursor(&self, delimiter: u8) -> Option<usize> {
        self.buffer[self.scanned..]
            .iter()
            .position(|&b| b == delimiter)
            .map(|i| self.scanned + i)
    }

    /// Discard whatever partial frame remains at end-of-stream.
    ///
    /// Returns the number of bytes dropped. A partial frame is never a
    /// message, so it is not reported as an error.
    pub fn finish(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.clear();
        dropped
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForPrefix;
        self.scanned = 0;
    }

    /// Payload length still awaited, if a prefix has been consumed.
    pub fn expected_len(&self) -> Option<usize> {
        match self.state {
            State::WaitingForPrefix => None,
            State::WaitingForPayload { expected } => Some(expected),
        }
    }
}
