//! Handler trait and the command table.
//!
//! Handlers take a JSON value and settle with a JSON value or a
//! [`HandlerError`]. Typed wrappers deserialize the input and serialize the
//! output, so application code works with its own types.
//!
//! # Example
//!
//! ```
//! use pipe_rpc::handler::{CommandTable, TypedHandler};
//! use pipe_rpc::HandlerError;
//!
//! let mut table = CommandTable::new();
//! table.insert(
//!     "add",
//!     TypedHandler::new(|(a, b): (i64, i64)| async move { Ok::<_, HandlerError>(a + b) }),
//! );
//!
//! assert!(table.get("add").is_some());
//! assert!(table.get("nope").is_none());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::codec::JsonCodec;
use crate::error::HandlerError;

/// Result type for handler functions.
pub type HandlerResult = std::result::Result<Value, HandlerError>;

/// Boxed future for handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for request handlers.
pub trait Handler: Send + Sync + 'static {
    /// Start handling a request.
    ///
    /// The returned future runs on its own task; it must not borrow `self`.
    fn call(&self, input: Value) -> BoxFuture<'static, HandlerResult>;
}

/// Async handler that deserializes its input and serializes its output.
pub struct TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> (Fut, R)>,
}

impl<F, T, R, Fut> TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
{
    /// Create a new typed handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R, Fut> Handler for TypedHandler<F, T, R, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
{
    fn call(&self, input: Value) -> BoxFuture<'static, HandlerResult> {
        let parsed: T = match parse_input(input) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        let fut = (self.handler)(parsed);
        Box::pin(async move {
            let output = fut.await?;
            render_output(&output)
        })
    }
}

/// Synchronous handler; runs to completion when called.
pub struct SyncHandler<F, T, R>
where
    F: Fn(T) -> std::result::Result<R, HandlerError> + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    handler: F,
    _phantom: PhantomData<fn(T) -> R>,
}

impl<F, T, R> SyncHandler<F, T, R>
where
    F: Fn(T) -> std::result::Result<R, HandlerError> + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    /// Create a new synchronous handler.
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, R> Handler for SyncHandler<F, T, R>
where
    F: Fn(T) -> std::result::Result<R, HandlerError> + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
{
    fn call(&self, input: Value) -> BoxFuture<'static, HandlerResult> {
        let result = parse_input(input)
            .and_then(|parsed| (self.handler)(parsed))
            .and_then(|output| render_output(&output));
        Box::pin(async move { result })
    }
}

fn parse_input<T: DeserializeOwned>(input: Value) -> std::result::Result<T, HandlerError> {
    JsonCodec::from_value(input).map_err(|e| HandlerError::new(format!("invalid input: {e}")))
}

fn render_output<R: Serialize>(output: &R) -> HandlerResult {
    JsonCodec::to_value(output).map_err(|e| HandlerError::new(format!("invalid output: {e}")))
}

/// Table mapping command names to handlers.
///
/// Filled while the server is being built and shared read-only once it runs.
#[derive(Clone, Default)]
pub struct CommandTable {
    commands: HashMap<String, Arc<dyn Handler>>,
}

impl CommandTable {
    /// Create a new empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`.
    ///
    /// Returns `true` if an earlier handler with the same name was replaced.
    pub fn insert<H: Handler>(&mut self, name: &str, handler: H) -> bool {
        self.insert_arc(name, Arc::new(handler))
    }

    /// Register an already shared handler under `name`.
    pub fn insert_arc(&mut self, name: &str, handler: Arc<dyn Handler>) -> bool {
        self.commands.insert(name.to_string(), handler).is_some()
    }

    /// Look up a handler by command name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Handler>> {
        self.commands.get(name)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl std::fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTable")
            .field("commands", &self.names())
            .finish()
    }
}
