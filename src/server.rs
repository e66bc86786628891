//! Server builder and the pump.
//!
//! The [`ServerBuilder`] provides a fluent API for registering handlers and
//! choosing the wire conventions. The [`Server`] runs the pump:
//! 1. Read available bytes from the input stream
//! 2. Extract every complete frame, numbering them in order
//! 3. Decode each frame and spawn its handler
//! 4. Hand each settled outcome to the writer task
//!
//! The pump never waits for a handler. A bad frame or a failing handler
//! costs one response; only a framing violation ends the stream.
//!
//! # Example
//!
//! ```no_run
//! use pipe_rpc::{HandlerError, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .command_sync("add", |(a, b): (i64, i64)| Ok::<_, HandlerError>(a + b))
//!         .command("echo", |v: serde_json::Value| async move { Ok::<_, HandlerError>(v) })
//!         .build()?;
//!
//!     server.serve_stdio().await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::task::JoinError;

use crate::codec::JsonCodec;
use crate::control::Diagnostics;
use crate::envelope::{Envelope, ResultWriter, TagStyle};
use crate::error::{HandlerError, RpcError, Result};
use crate::handler::{CommandTable, Dispatcher, Handler, SyncHandler, TypedHandler};
use crate::protocol::{Frame, FrameBuffer, Framing, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::writer::{
    spawn_writer_task, ResponseOrder, WriterConfig, WriterHandle, DEFAULT_CHANNEL_CAPACITY,
};

/// Default read buffer size.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Server configuration.
///
/// Framing and envelope are independent; any combination is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Framing discipline, both directions.
    pub framing: Framing,
    /// Output convention for handler outcomes.
    pub envelope: Envelope,
    /// Whether responses follow request order.
    pub response_order: ResponseOrder,
    /// Capacity of the completion queue.
    pub channel_capacity: usize,
    /// Largest accepted payload, in bytes.
    pub max_payload_size: usize,
    /// Size of each read from the input stream.
    pub read_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            framing: Framing::default(),
            envelope: Envelope::default(),
            response_order: ResponseOrder::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

/// Builder for configuring and creating a [`Server`].
///
/// Register either one handler (every request goes to it) or any number of
/// named commands (requests are `[name, argument]` pairs), not both.
pub struct ServerBuilder {
    config: ServerConfig,
    single: Option<Arc<dyn Handler>>,
    table: CommandTable,
}

impl ServerBuilder {
    /// Create a new server builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            single: None,
            table: CommandTable::new(),
        }
    }

    /// Set the single async handler.
    pub fn handler<F, T, R, Fut>(self, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
    {
        self.handler_with(TypedHandler::new(handler))
    }

    /// Set the single synchronous handler.
    pub fn handler_sync<F, T, R>(self, handler: F) -> Self
    where
        F: Fn(T) -> std::result::Result<R, HandlerError> + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.handler_with(SyncHandler::new(handler))
    }

    /// Set the single handler from any [`Handler`] implementation.
    pub fn handler_with<H: Handler>(mut self, handler: H) -> Self {
        if self.single.replace(Arc::new(handler)).is_some() {
            tracing::warn!("single handler registered twice; keeping the last one");
        }
        self
    }

    /// Register an async command handler.
    pub fn command<F, T, R, Fut>(self, name: &str, handler: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        Fut: Future<Output = std::result::Result<R, HandlerError>> + Send + 'static,
    {
        self.command_with(name, TypedHandler::new(handler))
    }

    /// Register a synchronous command handler.
    pub fn command_sync<F, T, R>(self, name: &str, handler: F) -> Self
    where
        F: Fn(T) -> std::result::Result<R, HandlerError> + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
    {
        self.command_with(name, SyncHandler::new(handler))
    }

    /// Register a command from any [`Handler`] implementation.
    ///
    /// A name registered twice keeps the last handler.
    pub fn command_with<H: Handler>(mut self, name: &str, handler: H) -> Self {
        if self.table.insert(name, handler) {
            tracing::warn!(command = name, "command registered twice; keeping the last one");
        }
        self
    }

    /// Set the framing discipline.
    ///
    /// Default: newline
    pub fn framing(mut self, framing: Framing) -> Self {
        self.config.framing = framing;
        self
    }

    /// Set the output convention.
    ///
    /// Default: tagged, object style (`Ok`/`Err`)
    pub fn envelope(mut self, envelope: Envelope) -> Self {
        self.config.envelope = envelope;
        self
    }

    /// Use the raw mirror convention.
    pub fn raw(self) -> Self {
        self.envelope(Envelope::Raw)
    }

    /// Use tagged envelopes with the given style.
    pub fn tagged(self, style: TagStyle) -> Self {
        self.envelope(Envelope::Tagged(style))
    }

    /// Set the response order.
    ///
    /// Default: ordered
    pub fn response_order(mut self, order: ResponseOrder) -> Self {
        self.config.response_order = order;
        self
    }

    /// Set the completion queue capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Set the largest accepted payload.
    ///
    /// Default: 64 MiB
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the read buffer size.
    ///
    /// Default: 64 KiB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the server.
    ///
    /// # Errors
    ///
    /// `Config` if no handler was registered, or if both a single handler
    /// and commands were.
    pub fn build(self) -> Result<Server> {
        let dispatcher = match (self.single, self.table.is_empty()) {
            (Some(_), false) => {
                return Err(RpcError::Config(
                    "both a single handler and commands are registered".to_string(),
                ))
            }
            (Some(handler), true) => Dispatcher::Single(handler),
            (None, false) => Dispatcher::table(self.table),
            (None, true) => return Err(RpcError::Config("no handler registered".to_string())),
        };

        Ok(Server {
            config: self.config,
            dispatcher,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured server, ready to serve one or more streams.
#[derive(Debug, Clone)]
pub struct Server {
    config: ServerConfig,
    dispatcher: Dispatcher,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The active configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The dispatch policy.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Serve stdin/stdout, with diagnostics on stderr.
    ///
    /// # Errors
    ///
    /// See [`serve`](Self::serve).
    pub async fn serve_stdio(&self) -> Result<()> {
        self.serve(tokio::io::stdin(), tokio::io::stdout(), Diagnostics::stderr())
            .await
    }

    /// Serve one stream until end-of-input or a fatal error.
    ///
    /// Every request dispatched before the pump stops still gets its
    /// response written before this returns.
    ///
    /// # Errors
    ///
    /// `FrameSync` on a framing violation, `Io` if either stream fails.
    pub async fn serve<R, W>(&self, reader: R, writer: W, diagnostics: Diagnostics) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let writer_config = WriterConfig {
            channel_capacity: self.config.channel_capacity,
            order: self.config.response_order,
        };
        let (handle, writer_task) = spawn_writer_task(writer, diagnostics, writer_config);
        let results = Arc::new(ResultWriter::new(
            self.config.framing,
            self.config.envelope.clone(),
        ));

        let pumped = self.pump(reader, &handle, &results).await;
        if let Err(e) = &pumped {
            tracing::error!("Pump stopped: {}", e);
        }

        // Handler tasks hold their own handles; the writer drains them all.
        drop(handle);
        let written = writer_task.await.map_err(|e| RpcError::Io(std::io::Error::other(e)))?;

        pumped?;
        written
    }

    /// Main read loop - reads bytes, extracts frames and dispatches them.
    async fn pump<R>(
        &self,
        mut reader: R,
        writer: &WriterHandle,
        results: &Arc<ResultWriter>,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut frame_buffer =
            FrameBuffer::with_max_payload(self.config.framing, self.config.max_payload_size);
        let mut buf = vec![0u8; self.config.read_buffer_size.max(1)];
        let mut seq: u64 = 0;

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => return Err(RpcError::Io(e)),
            };

            frame_buffer.extend(&buf[..n]);
            while let Some(frame) = frame_buffer.next_frame()? {
                self.dispatch_frame(seq, frame, writer, results).await;
                seq += 1;
            }

            if writer.is_closed() {
                tracing::debug!("writer stopped, no longer reading");
                return Ok(());
            }
        }

        let discarded = frame_buffer.finish();
        if discarded > 0 {
            tracing::debug!(discarded, "partial frame discarded at end of stream");
        }
        tracing::debug!(frames = seq, "input stream closed");
        Ok(())
    }

    /// Decode one frame and spawn its handler.
    async fn dispatch_frame(
        &self,
        seq: u64,
        frame: Frame,
        writer: &WriterHandle,
        results: &Arc<ResultWriter>,
    ) {
        let request = match JsonCodec::decode(frame.payload()) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!(seq, text = %frame.text_lossy(), "undecodable frame");
                if writer.send(results.complete(seq, Err(e))).await.is_err() {
                    tracing::debug!(seq, "writer closed, response dropped");
                }
                return;
            }
        };

        let dispatcher = self.dispatcher.clone();
        let writer = writer.clone();
        let results = results.clone();

        tokio::spawn(async move {
            let outcome = run_isolated(dispatcher, request).await;
            if let Err(e) = &outcome {
                tracing::debug!(seq, error = %e, "request failed");
            }
            if writer.send(results.complete(seq, outcome)).await.is_err() {
                tracing::debug!(seq, "writer closed, response dropped");
            }
        });
    }
}

/// Run a request on its own task so a panic is contained to it.
async fn run_isolated(dispatcher: Dispatcher, request: Value) -> Result<Value> {
    match tokio::spawn(async move { dispatcher.dispatch(request).await }).await {
        Ok(outcome) => outcome,
        Err(e) => Err(RpcError::Handler(panic_message(e))),
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "handler panicked".to_string()
            }
        }
        Err(err) => format!("handler task failed: {err}"),
    }
}
