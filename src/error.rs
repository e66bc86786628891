//! Error types for pipe-rpc.

use std::fmt;

use thiserror::Error;

/// Main error type for all pipe-rpc operations.
#[derive(Debug, Error)]
pub enum RpcError {
    /// I/O error on one of the pipe streams.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error on the outgoing side.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed length prefix. Fatal: the stream has no other frame boundary.
    #[error("frame sync error: {0}")]
    FrameSync(String),

    /// Payload is not valid JSON. Isolated to its frame.
    #[error("invalid JSON")]
    Decode {
        /// The payload as received (lossy UTF-8).
        text: String,
        #[source]
        source: serde_json::Error,
    },

    /// Table dispatch found no handler for the command name.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Table dispatch request was not a `[name, argument]` pair.
    #[error("malformed command: {0}")]
    MalformedCommand(String),

    /// The handler failed, panicked or rejected its input.
    #[error("{0}")]
    Handler(String),

    /// The server was configured inconsistently.
    #[error("configuration error: {0}")]
    Config(String),

    /// The remote side answered with a failure envelope.
    #[error("remote error: {0}")]
    Remote(String),

    /// The peer sent something that violates the agreed protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Connection closed before the expected frame arrived.
    #[error("connection closed")]
    ConnectionClosed,
}

impl RpcError {
    /// Whether this error ends the stream instead of a single request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RpcError::FrameSync(_) | RpcError::Io(_))
    }
}

impl From<HandlerError> for RpcError {
    fn from(e: HandlerError) -> Self {
        RpcError::Handler(e.0)
    }
}

/// Failure returned by a request handler.
///
/// Any `std::error::Error` converts into it, so handlers can use `?` freely.
/// Only the message survives; it becomes the `Err` payload on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError(String);

impl HandlerError {
    /// Create a handler error from anything printable.
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }

    /// Create a handler error from a JSON value.
    ///
    /// Strings are taken verbatim; everything else becomes compact JSON text.
    pub fn from_value(value: &serde_json::Value) -> Self {
        Self(stringify_value(value))
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error,
{
    fn from(e: E) -> Self {
        Self(e.to_string())
    }
}

/// Stringification rule shared by failure envelopes and diagnostic lines.
pub(crate) fn stringify_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Result type alias using RpcError.
pub type Result<T> = std::result::Result<T, RpcError>;
