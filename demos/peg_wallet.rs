//! Peg Wallet - typed requests on both ends of the pipe.
//!
//! Run without arguments, this is the worker: it reads wallet operations
//! from stdin and answers with the operation it recognized.
//!
//! ```text
//! $ printf '{"Mint":{"amount":5}}\n{"Transfer":{}}\n' | cargo run --example peg_wallet
//! {"Ok":"Mint"}
//! {"Err":"invalid input: unknown variant `Transfer`, expected one of `Mint`, `Burn`, `SetWalletAddress`"}
//! ```
//!
//! With `--parent` it spawns itself as the worker and calls it through
//! `RpcClient`.

use clap::Parser;
use pipe_rpc::{HandlerError, Protocol, RpcClient, RpcError, Server};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing_subscriber::EnvFilter;

/// Peg wallet worker, or its parent with `--parent`.
#[derive(Debug, Parser)]
#[command(name = "peg_wallet", about)]
struct Cli {
    /// Spawn a worker and send it a few operations.
    #[arg(long)]
    parent: bool,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Serialize, Deserialize)]
enum WalletOp {
    Mint { amount: u64 },
    Burn { amount: u64 },
    SetWalletAddress { address: String },
}

impl WalletOp {
    fn name(&self) -> &'static str {
        match self {
            WalletOp::Mint { .. } => "Mint",
            WalletOp::Burn { .. } => "Burn",
            WalletOp::SetWalletAddress { .. } => "SetWalletAddress",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    if cli.parent {
        run_parent().await
    } else {
        run_worker().await
    }
}

async fn run_worker() -> Result<(), Box<dyn std::error::Error>> {
    let server = Server::builder()
        .handler_sync(|op: WalletOp| {
            if let WalletOp::SetWalletAddress { address } = &op {
                if address.is_empty() {
                    return Err(HandlerError::new("empty wallet address"));
                }
            }
            tracing::info!(?op, "wallet operation");
            Ok(op.name())
        })
        .build()?;

    server.serve_stdio().await?;
    Ok(())
}

async fn run_parent() -> Result<(), Box<dyn std::error::Error>> {
    let mut client = RpcClient::spawn(Command::new(std::env::current_exe()?), Protocol::default())?;

    let ops = [
        WalletOp::Mint { amount: 5 },
        WalletOp::Burn { amount: 2 },
        WalletOp::SetWalletAddress {
            address: String::new(),
        },
    ];

    for op in &ops {
        match client.call::<_, String>(op).await {
            Ok(name) => println!("{} -> {name}", op.name()),
            Err(RpcError::Remote(message)) => println!("{} failed: {message}", op.name()),
            Err(e) => return Err(e.into()),
        }
    }

    let status = client.close().await?;
    tracing::debug!(?status, "worker finished");
    Ok(())
}
