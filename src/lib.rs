//! # pipe-rpc
//!
//! JSON-RPC over a single byte pipe, typically a child process's
//! stdin/stdout.
//!
//! The worker side reassembles frames from the input stream, decodes each
//! one as JSON, routes it to a handler and writes the outcome back. The
//! parent side ([`RpcClient`]) writes one request and reads one response
//! per call.
//!
//! ## Wire conventions
//!
//! Two independent choices, fixed per connection:
//!
//! - **Framing**: `<len>|<payload>` ([`Framing::LengthPrefixed`]) or one
//!   payload per line ([`Framing::Newline`])
//! - **Envelope**: the raw value, with failures on stderr
//!   ([`Envelope::Raw`]), or a tagged `{"Ok": v}` / `{"Err": msg}`
//!   ([`Envelope::Tagged`])
//!
//! Integers a JavaScript double cannot hold exactly are written as decimal
//! strings.
//!
//! ## `arbitrary_precision`
//!
//! This crate enables `serde_json`'s `arbitrary_precision` feature. Cargo
//! unifies features, so it applies to every crate in the build using
//! `serde_json`. Numbers inside `#[serde(untagged)]` enums and
//! `#[serde(flatten)]` fields then fail to deserialize, so typed handler
//! inputs should be plain structs or externally tagged enums.
//!
//! ## Example
//!
//! ```no_run
//! use pipe_rpc::{HandlerError, Server};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! enum Command {
//!     Mint { amount: u64 },
//!     Burn { amount: u64 },
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .handler_sync(|cmd: Command| {
//!             Ok::<_, HandlerError>(match cmd {
//!                 Command::Mint { amount } => amount,
//!                 Command::Burn { amount } => amount,
//!             })
//!         })
//!         .build()?;
//!
//!     server.serve_stdio().await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod control;
pub mod envelope;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod writer;

mod caller;
mod server;

pub use caller::{Protocol, RpcClient};
pub use envelope::{Envelope, Response, TagStyle};
pub use error::{HandlerError, Result, RpcError};
pub use protocol::Framing;
pub use server::{Server, ServerBuilder, ServerConfig, DEFAULT_READ_BUFFER_SIZE};
pub use writer::ResponseOrder;
