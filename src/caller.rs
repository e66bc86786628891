//! Parent-side caller.
//!
//! [`RpcClient`] is the other end of the pipe: it writes one request frame
//! and reads back one response frame per call. It speaks the same framings
//! and envelopes as [`Server`](crate::Server), so both sides only need to
//! agree on a [`Protocol`].
//!
//! # Example
//!
//! ```no_run
//! use pipe_rpc::{Protocol, RpcClient};
//! use tokio::process::Command;
//!
//! #[tokio::main]
//! async fn main() -> pipe_rpc::Result<()> {
//!     let mut client = RpcClient::spawn(Command::new("./worker"), Protocol::default())?;
//!
//!     let sum: i64 = client.command("add", &(1, 2)).await?;
//!     assert_eq!(sum, 3);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};

use crate::codec::JsonCodec;
use crate::envelope::{Envelope, Response};
use crate::error::{RpcError, Result};
use crate::protocol::{build_frame, Frame, FrameBuffer, Framing};

/// Read buffer size for responses.
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Wire conventions both sides of a pipe agree on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Protocol {
    /// Framing discipline, both directions.
    pub framing: Framing,
    /// Response envelope.
    pub envelope: Envelope,
}

impl Protocol {
    /// Create a protocol description.
    pub fn new(framing: Framing, envelope: Envelope) -> Self {
        Self { framing, envelope }
    }
}

/// Caller over a child process's stdin/stdout, or any byte pipe.
///
/// Calls are sequential: each one waits for its response frame. With the
/// raw mirror convention a failed request produces no frame at all, so a
/// call whose request fails on the remote side never returns.
pub struct RpcClient {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
    protocol: Protocol,
    frames: FrameBuffer,
    queued: VecDeque<Frame>,
    buf: Vec<u8>,
    child: Option<Child>,
}

impl RpcClient {
    /// Spawn `command` and talk to it over its stdin/stdout.
    ///
    /// The child's stderr is inherited, so its diagnostics reach this
    /// process's terminal. The child is killed when the client is dropped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the process cannot be started.
    pub fn spawn(mut command: Command, protocol: Protocol) -> Result<Self> {
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RpcError::Config("child stdin is not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RpcError::Config("child stdout is not piped".to_string()))?;

        tracing::debug!(pid = child.id(), "spawned worker");

        let mut client = Self::new(stdout, stdin, protocol);
        client.child = Some(child);
        Ok(client)
    }

    /// Caller over an existing pipe.
    pub fn new<R, W>(reader: R, writer: W, protocol: Protocol) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            frames: FrameBuffer::new(protocol.framing),
            protocol,
            queued: VecDeque::new(),
            buf: vec![0u8; READ_BUFFER_SIZE],
            child: None,
        }
    }

    /// The protocol in use.
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Send `input` and return the unwrapped, typed result.
    ///
    /// # Errors
    ///
    /// - `Remote` if the other side answered with a failure envelope
    /// - `Protocol` if the response carries neither tag
    /// - `ConnectionClosed` if the pipe ends before a response arrives
    /// - `Json` if the result does not deserialize into `O`
    pub async fn call<I, O>(&mut self, input: &I) -> Result<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let value = self.call_value(input).await?.into_result()?;
        JsonCodec::from_value(value)
    }

    /// Send a `[name, argument]` pair for table dispatch.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call).
    pub async fn command<A, O>(&mut self, name: &str, argument: &A) -> Result<O>
    where
        A: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        self.call(&(name, argument)).await
    }

    /// Send `input` and return the response without failing on `Err`.
    ///
    /// # Errors
    ///
    /// Transport and protocol errors only.
    pub async fn call_value<I>(&mut self, input: &I) -> Result<Response>
    where
        I: Serialize + ?Sized,
    {
        self.send(input).await?;
        let value = self.recv().await?;
        self.protocol.envelope.open(value)
    }

    /// Write one request frame and flush.
    ///
    /// # Errors
    ///
    /// Returns error if encoding or the write fails.
    pub async fn send<I>(&mut self, input: &I) -> Result<()>
    where
        I: Serialize + ?Sized,
    {
        let payload = JsonCodec::encode(&JsonCodec::to_value(input)?)?;
        let frame = build_frame(self.protocol.framing, &payload)?;
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read the next response frame and decode it, envelope still on.
    ///
    /// Frames that arrived together with an earlier one are returned first.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` at end-of-stream, `FrameSync` or `Decode` if the
    /// other side's output is malformed.
    pub async fn recv(&mut self) -> Result<Value> {
        let frame = self.next_frame().await?;
        JsonCodec::decode(frame.payload())
    }

    async fn next_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.queued.pop_front() {
                return Ok(frame);
            }

            let n = self.reader.read(&mut self.buf).await?;
            if n == 0 {
                let discarded = self.frames.finish();
                if discarded > 0 {
                    tracing::debug!(discarded, "partial response discarded");
                }
                return Err(RpcError::ConnectionClosed);
            }
            self.queued.extend(self.frames.push(&self.buf[..n])?);
        }
    }

    /// Close the request stream and wait for a spawned child to exit.
    ///
    /// Returns the child's exit status, or `None` for a plain pipe.
    ///
    /// # Errors
    ///
    /// Returns error if shutting down the pipe or waiting fails.
    pub async fn close(mut self) -> Result<Option<ExitStatus>> {
        self.writer.shutdown().await?;
        drop(self.writer);

        match self.child.take() {
            Some(mut child) => {
                let status = child.wait().await?;
                tracing::debug!(%status, "worker exited");
                Ok(Some(status))
            }
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("protocol", &self.protocol)
            .field("queued", &self.queued.len())
            .field("child", &self.child.as_ref().and_then(Child::id))
            .finish()
    }
}
