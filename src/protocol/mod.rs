//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements both framing disciplines of the pipe:
//! - length-prefixed (`5|"abc"`) and newline-delimited (`"abc"\n`) framing
//! - Frame buffer for accumulating partial reads
//! - Outgoing frame construction

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    check_prefix_digits, parse_length_prefix, Framing, DEFAULT_MAX_PAYLOAD_SIZE,
    LENGTH_SEPARATOR, LINE_TERMINATOR, MAX_PREFIX_DIGITS,
};
