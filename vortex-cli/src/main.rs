//! Command-line entry point for the vortex engine runner.
//!
//! Unlike the HTTP control plane (§6, out of scope for this crate), this
//! binary drives a single `Task` standalone for local testing and
//! demoing: load a program from disk, feed it a recorded JSON points
//! file, let it run to completion, and print its final statistics.

mod commands;

use clap::Parser;

#[derive(Parser)]
#[command(name = "vortex-cli", about = "Run a vortex pipeline program standalone")]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vortex_shared::logging::init_tracing();
    let cli = Cli::parse();
    commands::dispatch(cli.command).await
}
