//! Diagnostic side-channel.
//!
//! With the raw mirror convention a failed request produces no frame on the
//! main output. Its message goes here instead, as a plain `error: <message>`
//! line. For stdio deployments that is stderr; the parent inherits it, so the
//! line ends up on the operator's terminal.
//!
//! # Important
//!
//! - **stdout** is the protocol channel; never write diagnostics there
//! - Each line is written whole and flushed immediately

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Prefix of every diagnostic line.
pub const DIAGNOSTIC_PREFIX: &str = "error: ";

/// Format a failure message as one diagnostic line, newline included.
pub fn diagnostic_line(message: &str) -> String {
    format!("{DIAGNOSTIC_PREFIX}{message}\n")
}

/// Line writer for the diagnostic stream.
pub struct Diagnostics {
    sink: Option<Box<dyn AsyncWrite + Send + Unpin>>,
}

impl Diagnostics {
    /// Diagnostics over any async writer.
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            sink: Some(Box::new(writer)),
        }
    }

    /// Diagnostics on the process's stderr.
    pub fn stderr() -> Self {
        Self::new(tokio::io::stderr())
    }

    /// Diagnostics that only go to the debug log.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Whether lines are written anywhere.
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Write `error: <message>` as one line and flush.
    ///
    /// # Errors
    ///
    /// Returns the I/O error of the underlying writer.
    pub async fn report(&mut self, message: &str) -> std::io::Result<()> {
        let Some(sink) = self.sink.as_mut() else {
            tracing::debug!(message, "diagnostic dropped");
            return Ok(());
        };
        sink.write_all(diagnostic_line(message).as_bytes()).await?;
        sink.flush().await
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::stderr()
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
