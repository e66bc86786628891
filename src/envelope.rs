//! Result envelopes and the result writer.
//!
//! An [`Envelope`] decides how a handler outcome appears on the wire:
//!
//! - **Raw mirror**: a success value is written as-is; a failure produces no
//!   frame, only an `error: <message>` diagnostic line.
//! - **Tagged**: every outcome is one frame. Object style writes
//!   `{"Ok": value}` / `{"Err": message}`, pair style writes
//!   `["ok", value]` / `["error", message]`. Tag names are configurable.
//!
//! [`ResultWriter`] turns an outcome into a ready-to-write [`Completion`];
//! [`Envelope::open`] is the inverse used by the calling side.
//!
//! # Example
//!
//! ```
//! use pipe_rpc::envelope::{Envelope, Response, TagStyle};
//! use serde_json::json;
//!
//! let envelope = Envelope::Tagged(TagStyle::object());
//! assert_eq!(envelope.wrap_ok(json!("Mint")), json!({"Ok": "Mint"}));
//! assert_eq!(envelope.wrap_err("invalid JSON"), Some(json!({"Err": "invalid JSON"})));
//!
//! let pair = Envelope::Tagged(TagStyle::pair());
//! assert_eq!(pair.open(json!(["ok", 3])).unwrap(), Response::Ok(json!(3)));
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::JsonCodec;
use crate::error::{stringify_value, RpcError, Result};
use crate::protocol::Framing;
use crate::writer::{Completion, OutboundFrame};

/// Default success tag for object style.
pub const OBJECT_OK_TAG: &str = "Ok";
/// Default failure tag for object style.
pub const OBJECT_ERR_TAG: &str = "Err";
/// Default success tag for pair style.
pub const PAIR_OK_TAG: &str = "ok";
/// Default failure tag for pair style.
pub const PAIR_ERR_TAG: &str = "error";

/// How tagged outcomes are laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagStyle {
    /// `{"<ok>": value}` / `{"<err>": message}`.
    Object { ok: String, err: String },
    /// `["<ok>", value]` / `["<err>", message]`.
    Pair { ok: String, err: String },
}

impl TagStyle {
    /// Object style with `Ok`/`Err` tags.
    pub fn object() -> Self {
        TagStyle::Object {
            ok: OBJECT_OK_TAG.to_string(),
            err: OBJECT_ERR_TAG.to_string(),
        }
    }

    /// Pair style with `ok`/`error` tags.
    pub fn pair() -> Self {
        TagStyle::Pair {
            ok: PAIR_OK_TAG.to_string(),
            err: PAIR_ERR_TAG.to_string(),
        }
    }

    /// Success tag.
    pub fn ok_tag(&self) -> &str {
        match self {
            TagStyle::Object { ok, .. } | TagStyle::Pair { ok, .. } => ok,
        }
    }

    /// Failure tag.
    pub fn err_tag(&self) -> &str {
        match self {
            TagStyle::Object { err, .. } | TagStyle::Pair { err, .. } => err,
        }
    }

    fn wrap(&self, tag: &str, value: Value) -> Value {
        match self {
            TagStyle::Object { .. } => {
                let mut map = serde_json::Map::with_capacity(1);
                map.insert(tag.to_string(), value);
                Value::Object(map)
            }
            TagStyle::Pair { .. } => Value::Array(vec![Value::String(tag.to_string()), value]),
        }
    }

    /// Split a tagged value into its tag and content.
    fn split(&self, value: Value) -> Option<(String, Value)> {
        match (self, value) {
            (TagStyle::Object { .. }, Value::Object(map)) if map.len() == 1 => {
                map.into_iter().next()
            }
            (TagStyle::Pair { .. }, Value::Array(mut items)) if items.len() == 2 => {
                let content = items.pop()?;
                match items.pop()? {
                    Value::String(tag) => Some((tag, content)),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

impl Default for TagStyle {
    fn default() -> Self {
        Self::object()
    }
}

/// Output convention for handler outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Envelope {
    /// Successes written as-is, failures only as diagnostics.
    Raw,
    /// Every outcome written as a tagged frame.
    Tagged(TagStyle),
}

impl Default for Envelope {
    fn default() -> Self {
        Envelope::Tagged(TagStyle::object())
    }
}

/// A decoded outcome, as seen by the calling side.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// The handler's value.
    Ok(Value),
    /// The failure message.
    Err(String),
}

impl Response {
    /// Convert into a `Result`, failures becoming `RpcError::Remote`.
    pub fn into_result(self) -> Result<Value> {
        match self {
            Response::Ok(value) => Ok(value),
            Response::Err(message) => Err(RpcError::Remote(message)),
        }
    }
}

impl Envelope {
    /// Whether this is the raw mirror convention.
    pub fn is_raw(&self) -> bool {
        matches!(self, Envelope::Raw)
    }

    /// Wrap a success value for the wire.
    pub fn wrap_ok(&self, value: Value) -> Value {
        match self {
            Envelope::Raw => value,
            Envelope::Tagged(style) => style.wrap(style.ok_tag(), value),
        }
    }

    /// Wrap a failure message for the wire.
    ///
    /// Returns `None` for the raw mirror, which has no failure frame.
    pub fn wrap_err(&self, message: &str) -> Option<Value> {
        match self {
            Envelope::Raw => None,
            Envelope::Tagged(style) => {
                Some(style.wrap(style.err_tag(), Value::String(message.to_string())))
            }
        }
    }

    /// Unwrap a received value into a [`Response`].
    ///
    /// A raw value is always a success. A failure's content is stringified:
    /// strings verbatim, anything else as compact JSON.
    ///
    /// # Errors
    ///
    /// `RpcError::Protocol` if a tagged value carries neither tag.
    pub fn open(&self, value: Value) -> Result<Response> {
        let style = match self {
            Envelope::Raw => return Ok(Response::Ok(value)),
            Envelope::Tagged(style) => style,
        };

        let shown = value.to_string();
        match style.split(value) {
            Some((tag, content)) if tag == style.ok_tag() => Ok(Response::Ok(content)),
            Some((tag, content)) if tag == style.err_tag() => {
                Ok(Response::Err(stringify_value(&content)))
            }
            _ => Err(RpcError::Protocol(format!("untagged response: {shown}"))),
        }
    }
}

/// Turns handler outcomes into completions for the writer task.
#[derive(Debug, Clone)]
pub struct ResultWriter {
    framing: Framing,
    envelope: Envelope,
}

impl ResultWriter {
    /// Create a result writer for one connection.
    pub fn new(framing: Framing, envelope: Envelope) -> Self {
        Self { framing, envelope }
    }

    /// The envelope in use.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Build the completion for request `seq`.
    ///
    /// A success value that cannot be encoded or framed is reported as a
    /// failure of that request.
    pub fn complete(&self, seq: u64, outcome: Result<Value>) -> Completion {
        let failure = match outcome {
            Ok(value) => match self.encode(self.envelope.wrap_ok(value)) {
                Ok(frame) => return Completion::frame(seq, frame),
                Err(e) => {
                    tracing::warn!(seq, error = %e, "response could not be encoded");
                    e.to_string()
                }
            },
            Err(e) => e.to_string(),
        };
        self.fail(seq, &failure)
    }

    /// Build the failure completion for request `seq`.
    pub fn fail(&self, seq: u64, message: &str) -> Completion {
        let Some(value) = self.envelope.wrap_err(message) else {
            return Completion::diagnostic(seq, message);
        };
        match self.encode(value) {
            Ok(frame) => Completion::frame(seq, frame),
            // A tagged string never fails to encode; keep the message visible anyway.
            Err(e) => {
                tracing::error!(seq, error = %e, "failure envelope could not be encoded");
                Completion::diagnostic(seq, message)
            }
        }
    }

    fn encode(&self, value: Value) -> Result<OutboundFrame> {
        let payload = JsonCodec::encode(&value)?;
        OutboundFrame::new(self.framing, Bytes::from(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(completion: &Completion) -> Vec<u8> {
        let frame = completion.frame.as_ref().unwrap();
        [&frame.head[..], &frame.payload[..], frame.tail].concat()
    }

    #[test]
    fn test_object_style() {
        let envelope = Envelope::default();
        assert_eq!(envelope.wrap_ok(json!(1)), json!({"Ok": 1}));
        assert_eq!(envelope.wrap_err("boom"), Some(json!({"Err": "boom"})));
    }

    #[test]
    fn test_pair_style() {
        let envelope = Envelope::Tagged(TagStyle::pair());
        assert_eq!(envelope.wrap_ok(json!({"a": 1})), json!(["ok", {"a": 1}]));
        assert_eq!(
            envelope.wrap_err("invalid JSON"),
            Some(json!(["error", "invalid JSON"]))
        );
    }

    #[test]
    fn test_custom_tags() {
        let envelope = Envelope::Tagged(TagStyle::Object {
            ok: "result".to_string(),
            err: "error".to_string(),
        });
        assert_eq!(envelope.wrap_ok(json!(true)), json!({"result": true}));
        assert_eq!(
            envelope.open(json!({"error": "nope"})).unwrap(),
            Response::Err("nope".to_string())
        );
    }

    #[test]
    fn test_raw_has_no_failure_frame() {
        let envelope = Envelope::Raw;
        assert_eq!(envelope.wrap_ok(json!("abc")), json!("abc"));
        assert_eq!(envelope.wrap_err("boom"), None);
        assert_eq!(
            envelope.open(json!({"Err": "x"})).unwrap(),
            Response::Ok(json!({"Err": "x"}))
        );
    }

    #[test]
    fn test_open_stringifies_failures() {
        let envelope = Envelope::default();
        assert_eq!(
            envelope.open(json!({"Err": {"code": 7}})).unwrap(),
            Response::Err(r#"{"code":7}"#.to_string())
        );
    }

    #[test]
    fn test_open_rejects_untagged() {
        let envelope = Envelope::default();
        for value in [json!(1), json!({"Ok": 1, "Err": 2}), json!({"Maybe": 1})] {
            assert!(matches!(envelope.open(value), Err(RpcError::Protocol(_))));
        }

        let pair = Envelope::Tagged(TagStyle::pair());
        assert!(pair.open(json!([1, 2])).is_err());
        assert!(pair.open(json!(["ok"])).is_err());
    }

    #[test]
    fn test_response_into_result() {
        assert_eq!(Response::Ok(json!(1)).into_result().unwrap(), json!(1));
        assert!(matches!(
            Response::Err("boom".into()).into_result(),
            Err(RpcError::Remote(ref m)) if m == "boom"
        ));
    }

    #[test]
    fn test_envelope_config_serde() {
        let raw: Envelope = serde_json::from_str(r#""raw""#).unwrap();
        assert_eq!(raw, Envelope::Raw);

        let pair: Envelope =
            serde_json::from_str(r#"{"tagged":{"pair":{"ok":"ok","err":"error"}}}"#).unwrap();
        assert_eq!(pair, Envelope::Tagged(TagStyle::pair()));
    }

    #[test]
    fn test_result_writer_success() {
        let writer = ResultWriter::new(Framing::Newline, Envelope::default());
        let completion = writer.complete(4, Ok(json!("Mint")));

        assert_eq!(completion.seq, 4);
        assert!(completion.diagnostic.is_none());
        assert_eq!(wire(&completion), b"{\"Ok\":\"Mint\"}\n");
    }

    #[test]
    fn test_result_writer_failure_tagged() {
        let writer = ResultWriter::new(Framing::Newline, Envelope::default());
        let err = JsonCodec::decode(b"not json").unwrap_err();

        let completion = writer.complete(0, Err(err));
        assert_eq!(wire(&completion), b"{\"Err\":\"invalid JSON\"}\n");
    }

    #[test]
    fn test_result_writer_raw() {
        let writer = ResultWriter::new(Framing::LengthPrefixed, Envelope::Raw);

        let ok = writer.complete(0, Ok(json!("abc")));
        assert_eq!(wire(&ok), br#"5|"abc""#);

        let failed = writer.complete(1, Err(RpcError::UnknownCommand("nope".into())));
        assert!(failed.frame.is_none());
        assert_eq!(failed.diagnostic.as_deref(), Some("unknown command: nope"));
    }

    #[test]
    fn test_result_writer_applies_safe_integer_rule() {
        let writer = ResultWriter::new(Framing::LengthPrefixed, Envelope::default());
        let completion = writer.complete(0, Ok(json!(u64::MAX)));
        assert_eq!(wire(&completion), br#"29|{"Ok":"18446744073709551615"}"#);
    }
}
