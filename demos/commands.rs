//! Command Worker - table dispatch by command name.
//!
//! Requests are `[name, argument]` pairs:
//!
//! ```text
//! $ printf '["add",[1,2]]\n["shout","hi"]\n["nope",1]\n' | cargo run --example commands
//! {"Ok":3}
//! {"Ok":"HI"}
//! {"Err":"unknown command: nope"}
//! ```
//!
//! `--pair` switches to `["ok", v]` / `["error", msg]` responses.

use std::time::Duration;

use clap::Parser;
use pipe_rpc::{Framing, HandlerError, Server, TagStyle};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// Serve a few demo commands over stdin/stdout.
#[derive(Debug, Parser)]
#[command(name = "commands", about)]
struct Cli {
    /// Framing discipline: length-prefixed or newline.
    #[arg(long, default_value = "newline")]
    framing: Framing,

    /// Use pair-style tags instead of `{"Ok": ...}` objects.
    #[arg(long)]
    pair: bool,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Deserialize)]
struct Delay {
    ms: u64,
    value: serde_json::Value,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose > 0 { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    let style = if cli.pair {
        TagStyle::pair()
    } else {
        TagStyle::object()
    };

    let server = Server::builder()
        .command_sync("add", |(a, b): (i64, i64)| Ok::<_, HandlerError>(a + b))
        .command_sync("shout", |s: String| Ok::<_, HandlerError>(s.to_uppercase()))
        .command_sync("parse", |s: String| Ok::<_, HandlerError>(s.parse::<u64>()?))
        .command("delay", |d: Delay| async move {
            tokio::time::sleep(Duration::from_millis(d.ms)).await;
            Ok::<_, HandlerError>(d.value)
        })
        .framing(cli.framing)
        .tagged(style)
        .build()?;

    server.serve_stdio().await?;
    Ok(())
}
