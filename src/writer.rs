//! Dedicated writer task for the main output.
//!
//! Handler tasks never touch the output stream. Each one sends a
//! [`Completion`] over an mpsc channel to a single writer task, which owns
//! the stream and writes every frame whole, so frames are never interleaved.
//!
//! # Architecture
//!
//! ```text
//! Handler 1 ─┐
//! Handler 2 ─┼─► mpsc::Sender<Completion> ─► Writer Task ─┬─► main output
//! Handler N ─┘                                            └─► diagnostics
//! ```
//!
//! In [`ResponseOrder::Ordered`] mode the writer holds back completions that
//! settled early until every lower sequence number has been written.
//! Ready frames are batched into a single `write_vectored` call.

use std::collections::BTreeMap;
use std::fmt;
use std::io::IoSlice;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::control::Diagnostics;
use crate::error::{RpcError, Result};
use crate::protocol::Framing;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum completions to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Order in which responses are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseOrder {
    /// Responses follow request order, even if handlers settle out of order.
    #[default]
    Ordered,
    /// Responses are written as soon as their handler settles.
    Unordered,
}

impl ResponseOrder {
    /// Kebab-case name, as accepted by `FromStr`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseOrder::Ordered => "ordered",
            ResponseOrder::Unordered => "unordered",
        }
    }
}

impl fmt::Display for ResponseOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseOrder {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ordered" => Ok(ResponseOrder::Ordered),
            "unordered" => Ok(ResponseOrder::Unordered),
            other => Err(RpcError::Config(format!("unknown response order: {other}"))),
        }
    }
}

/// A frame ready to be written: head, payload and tail.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Length prefix and separator, or empty for newline framing.
    pub head: Bytes,
    /// Encoded JSON payload.
    pub payload: Bytes,
    /// Line terminator, or empty for length-prefixed framing.
    pub tail: &'static [u8],
}

impl OutboundFrame {
    /// Frame `payload` with the given discipline.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be carried by `framing`.
    pub fn new(framing: Framing, payload: Bytes) -> Result<Self> {
        framing.validate_payload(&payload)?;
        Ok(Self {
            head: Bytes::from(framing.encode_head(payload.len())),
            payload,
            tail: framing.tail(),
        })
    }

    /// Total size of this frame on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        self.head.len() + self.payload.len() + self.tail.len()
    }

    fn parts(&self) -> [&[u8]; 3] {
        [&self.head[..], &self.payload[..], self.tail]
    }
}

/// The settled outcome of one request, waiting to be written.
#[derive(Debug)]
pub struct Completion {
    /// Sequence number of the request's frame.
    pub seq: u64,
    /// Frame for the main output, if the outcome has one.
    pub frame: Option<OutboundFrame>,
    /// Message for the diagnostic stream, if any.
    pub diagnostic: Option<String>,
}

impl Completion {
    /// Completion that writes a frame.
    pub fn frame(seq: u64, frame: OutboundFrame) -> Self {
        Self {
            seq,
            frame: Some(frame),
            diagnostic: None,
        }
    }

    /// Completion that only writes a diagnostic line.
    pub fn diagnostic(seq: u64, message: impl Into<String>) -> Self {
        Self {
            seq,
            frame: None,
            diagnostic: Some(message.into()),
        }
    }
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the completion queue.
    pub channel_capacity: usize,
    /// Whether completions are reordered by sequence number.
    pub order: ResponseOrder,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            order: ResponseOrder::default(),
        }
    }
}

/// Handle for sending completions to the writer task.
///
/// Cheaply cloneable; each handler task holds one. The writer stops once
/// every handle is dropped and the queue is drained.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Completion>,
}

impl WriterHandle {
    /// Queue a completion, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` if the writer task has stopped.
    pub async fn send(&self, completion: Completion) -> Result<()> {
        self.tx
            .send(completion)
            .await
            .map_err(|_| RpcError::ConnectionClosed)
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending completions.
///
/// The returned `JoinHandle` resolves once all handles are dropped and
/// everything queued has been written, or with the first I/O error on the
/// main output.
pub fn spawn_writer_task<W>(
    writer: W,
    diagnostics: Diagnostics,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer, diagnostics, config.order));
    (WriterHandle { tx }, task)
}

/// Holds back early completions in ordered mode.
struct Reorder {
    order: ResponseOrder,
    next: u64,
    held: BTreeMap<u64, Completion>,
}

impl Reorder {
    fn new(order: ResponseOrder) -> Self {
        Self {
            order,
            next: 0,
            held: BTreeMap::new(),
        }
    }

    /// Accept a completion, moving everything now writable into `ready`.
    fn push(&mut self, completion: Completion, ready: &mut Vec<Completion>) {
        if self.order == ResponseOrder::Unordered {
            ready.push(completion);
            return;
        }

        if completion.seq != self.next {
            self.held.insert(completion.seq, completion);
            return;
        }
        ready.push(completion);
        self.next += 1;
        while let Some(held) = self.held.remove(&self.next) {
            ready.push(held);
            self.next += 1;
        }
    }

    /// Release whatever is still held, lowest sequence first.
    fn drain(&mut self, ready: &mut Vec<Completion>) {
        if !self.held.is_empty() {
            tracing::warn!(
                held = self.held.len(),
                next = self.next,
                "writer closing with gaps in the response sequence"
            );
        }
        ready.extend(std::mem::take(&mut self.held).into_values());
    }
}

/// Main writer loop - receives completions and writes them out.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Completion>,
    mut writer: W,
    mut diagnostics: Diagnostics,
    order: ResponseOrder,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut reorder = Reorder::new(order);
    let mut ready = Vec::with_capacity(MAX_BATCH_SIZE);

    while let Some(first) = rx.recv().await {
        reorder.push(first, &mut ready);

        // Collect additional settled completions (non-blocking)
        let mut received = 1;
        while received < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(completion) => {
                    reorder.push(completion, &mut ready);
                    received += 1;
                }
                Err(_) => break,
            }
        }

        flush_ready(&mut writer, &mut diagnostics, &mut ready).await?;
    }

    reorder.drain(&mut ready);
    flush_ready(&mut writer, &mut diagnostics, &mut ready).await?;
    tracing::debug!("writer task finished");
    Ok(())
}

/// Write diagnostics and frames of `ready`, leaving it empty.
async fn flush_ready<W>(
    writer: &mut W,
    diagnostics: &mut Diagnostics,
    ready: &mut Vec<Completion>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if ready.is_empty() {
        return Ok(());
    }

    let mut batch = Vec::with_capacity(ready.len());
    for completion in ready.drain(..) {
        if let Some(message) = completion.diagnostic {
            // The diagnostic stream is best effort; it never stops the writer.
            if let Err(e) = diagnostics.report(&message).await {
                tracing::warn!(error = %e, "failed to write diagnostic line");
            }
        }
        if let Some(frame) = completion.frame {
            batch.push(frame);
        }
    }

    write_batch(writer, &batch).await
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[OutboundFrame]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(OutboundFrame::size).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        if slices.is_empty() {
            break;
        }

        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(RpcError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for the data after the first `skip_bytes` bytes.
fn build_remaining_slices(batch: &[OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len() * 3);
    let mut offset = 0;

    for frame in batch {
        for part in frame.parts() {
            let end = offset + part.len();
            if !part.is_empty() && skip_bytes < end {
                let start = skip_bytes.saturating_sub(offset);
                slices.push(IoSlice::new(&part[start..]));
            }
            offset = end;
        }
    }

    slices
}
