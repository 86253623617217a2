//! ccdeploy — idempotent channel and chaincode deployment.
//!
//! # Usage
//!
//! ```text
//! ccdeploy init [PATH] [--force]
//! ccdeploy deploy  [--config PATH] (--gateway URL | --simulate) [--json]
//! ccdeploy inspect [--config PATH] (--gateway URL | --simulate) [--json]
//! ```
//!
//! Logs go to stderr; set `RUST_LOG` (default `info`) to adjust.

mod commands;
mod gateway;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{deploy::DeployArgs, init::InitArgs, inspect::InspectArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "ccdeploy",
    version,
    about = "Provision a channel and deploy chaincode, safely re-runnable",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write an example deployment configuration.
    Init(InitArgs),

    /// Provision the channel, then install / upgrade / instantiate the chaincode.
    Deploy(DeployArgs),

    /// Show per-peer channel membership and chaincode state without writing.
    Inspect(InspectArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Deploy(args) => args.run(),
        Commands::Inspect(args) => args.run(),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
