//! Codec module - JSON encoding/decoding of frame payloads.
//!
//! - [`JsonCodec`] - `serde_json` with the safe-integer rule on output
//! - [`wire_float`] - serde helper writing non-finite floats as text
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects;
//! the payload format is fixed, only the framing around it varies.
//!
//! # Example
//!
//! ```
//! use pipe_rpc::codec::JsonCodec;
//! use serde_json::json;
//!
//! let encoded = JsonCodec::encode(&json!("hello")).unwrap();
//! let decoded = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, json!("hello"));
//! ```

mod json;

pub use json::{is_unsafe_integer, to_wire_value, wire_float, JsonCodec, MAX_SAFE_INTEGER};
