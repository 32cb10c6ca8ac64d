//! Command-line interface for ctrlio
//!
//! # Usage Examples
//!
//! ## Concatenate
//! ```bash
//! # Relay three files to stdout through one stream
//! ctrlio cat a.log b.log c.log > all.log
//!
//! # Smaller chunks, faster re-probing
//! ctrlio cat --buffer-size 256 --pause 20ms a.log b.log
//! ```
//!
//! ## Follow
//! ```bash
//! # Relay the rotated logs, then follow the live one until Ctrl+C
//! ctrlio follow app.log.2 app.log.1 app.log
//!
//! # Same, but stop on its own after five minutes
//! CTRLIO_TIMEOUT=5m ctrlio follow app.log.1 app.log
//! ```
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (e.g. `RUST_LOG=ctrlio=debug,ctrl_reader=debug`).

use clap::{Parser, Subcommand};
use ctrlio::{Mode, ReaderOpts, Relay};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "ctrlio")]
#[command(about = "Relay files through a controlled, switchable read stream")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Concatenate files to stdout, ending once the last file is drained
    Cat {
        /// Files to relay, in order
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        #[command(flatten)]
        opts: ReaderOpts,
    },

    /// Concatenate files to stdout, then keep following the last one
    /// until the timeout elapses or Ctrl+C is pressed
    Follow {
        /// Files to relay, in order; the last one is followed
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        #[command(flatten)]
        opts: ReaderOpts,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    // Initialize tracing; stdout carries the relayed data
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let (files, mode, opts) = match cli.command {
        Commands::Cat { files, opts } => (files, Mode::Cat, opts),
        Commands::Follow { files, opts } => (files, Mode::Follow, opts),
    };

    let cancel = CancellationToken::new();
    setup_shutdown_handler(cancel.clone());

    let relay = Relay::new(files, mode, &opts);
    relay.run(cancel, std::io::stdout()).await?;
    Ok(())
}

/// Cancels `cancel` on Ctrl+C
fn setup_shutdown_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => {
                        info!("Received interrupt signal (Ctrl+C)");
                        cancel.cancel();
                    }
                    Err(e) => warn!("Failed to install CTRL+C signal handler: {e}"),
                }
            }
        }
    });
}
