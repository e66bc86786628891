//! Mirror Worker - echoes every request back unchanged.
//!
//! This example demonstrates:
//! - A single identity handler
//! - The raw mirror convention: values out as-is, failures on stderr
//! - Logging to stderr, so stdout stays a clean protocol channel
//!
//! # Running
//!
//! ```text
//! $ printf '5|"abc"' | cargo run --example mirror
//! 5|"abc"
//! $ printf 'not json\n' | cargo run --example mirror -- --framing newline
//! error: invalid JSON
//! ```

use clap::Parser;
use pipe_rpc::{Framing, HandlerError, ResponseOrder, Server};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Echo JSON frames from stdin to stdout.
#[derive(Debug, Parser)]
#[command(name = "mirror", about)]
struct Cli {
    /// Framing discipline: length-prefixed or newline.
    #[arg(long, default_value = "length-prefixed")]
    framing: Framing,

    /// Response order: ordered or unordered.
    #[arg(long, default_value = "ordered")]
    order: ResponseOrder,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let server = Server::builder()
        .handler_sync(|value: Value| Ok::<_, HandlerError>(value))
        .framing(cli.framing)
        .response_order(cli.order)
        .raw()
        .build()?;

    tracing::debug!(framing = %cli.framing, "mirror starting");
    server.serve_stdio().await?;
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
