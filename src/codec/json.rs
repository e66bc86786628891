//! JSON codec using `serde_json`.
//!
//! **Integers outside the safe double range are written as strings.**
//!
//! A JavaScript peer parses every JSON number into an IEEE-754 double, so an
//! integer with magnitude above 2^53 − 1 would silently lose digits. The
//! encoder writes such integers as decimal strings holding every digit
//! instead. `serde_json` runs with `arbitrary_precision`, so oversized
//! integers in incoming payloads are also kept exactly.
//!
//! # Example
//!
//! ```
//! use pipe_rpc::codec::JsonCodec;
//! use serde_json::json;
//!
//! let payload = JsonCodec::encode(&json!({"id": 18446744073709551615u64, "n": 7})).unwrap();
//! assert_eq!(payload, br#"{"id":"18446744073709551615","n":7}"#);
//!
//! let value = JsonCodec::decode(br#"[1,"two"]"#).unwrap();
//! assert_eq!(value, json!([1, "two"]));
//! ```

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::{Number, Value};

use crate::error::{RpcError, Result};

/// Largest integer a double represents exactly (2^53 − 1).
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// JSON codec for frame payloads.
pub struct JsonCodec;

impl JsonCodec {
    /// Decode a frame payload into a JSON value.
    ///
    /// # Errors
    ///
    /// `RpcError::Decode` carrying the received text if the payload is not a
    /// single valid JSON value.
    pub fn decode(payload: &[u8]) -> Result<Value> {
        serde_json::from_slice(payload).map_err(|source| RpcError::Decode {
            text: String::from_utf8_lossy(payload).into_owned(),
            source,
        })
    }

    /// Encode a JSON value as compact text, applying the safe-integer rule.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    pub fn encode(value: &Value) -> Result<Vec<u8>> {
        if has_unsafe_integer(value) {
            let rewritten = to_wire_value(value.clone());
            Ok(serde_json::to_vec(&rewritten)?)
        } else {
            Ok(serde_json::to_vec(value)?)
        }
    }

    /// Convert a typed value into a JSON value.
    #[inline]
    pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
        Ok(serde_json::to_value(value)?)
    }

    /// Convert a JSON value into a typed value.
    #[inline]
    pub fn from_value<T: DeserializeOwned>(value: Value) -> Result<T> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Rewrite every unsafe integer in `value` as its decimal string.
pub fn to_wire_value(value: Value) -> Value {
    match value {
        Value::Number(n) if is_unsafe_integer(&n) => Value::String(n.to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(to_wire_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, to_wire_value(v)))
                .collect(),
        ),
        other => other,
    }
}

fn has_unsafe_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => is_unsafe_integer(n),
        Value::Array(items) => items.iter().any(has_unsafe_integer),
        Value::Object(map) => map.values().any(has_unsafe_integer),
        _ => false,
    }
}

/// Whether `n` is an integer a double cannot hold exactly.
///
/// Floats (anything written with a fraction or exponent) are never unsafe.
pub fn is_unsafe_integer(n: &Number) -> bool {
    if let Some(v) = n.as_u64() {
        return v > MAX_SAFE_INTEGER;
    }
    if let Some(v) = n.as_i64() {
        return v.unsigned_abs() > MAX_SAFE_INTEGER;
    }
    // Out of 64-bit range: an integer only if written without fraction/exponent.
    !n.to_string()
        .bytes()
        .any(|b| matches!(b, b'.' | b'e' | b'E'))
}

/// Serialize an `f64` so non-finite values survive as text.
///
/// JSON has no literal for `NaN` or the infinities and `serde_json` would
/// write `null`. Use with `#[serde(serialize_with = "pipe_rpc::codec::wire_float")]`.
pub fn wire_float<S>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if value.is_finite() {
        serializer.serialize_f64(*value)
    } else if value.is_nan() {
        serializer.serialize_str("NaN")
    } else if value.is_sign_positive() {
        serializer.serialize_str("Infinity")
    } else {
        serializer.serialize_str("-Infinity")
    }
}
