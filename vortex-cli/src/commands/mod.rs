//! Command handlers for the vortex CLI.
//!
//! Each module handles one command group, delegating to `vortex-engine`
//! for the actual compilation/execution work.

pub mod run;
pub mod stats;

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Command {
    /// Compile a program and feed it a recorded points file to completion.
    Run(run::RunArgs),
    /// Compile a program and print its node table without running it.
    Stats(stats::StatsArgs),
}

pub async fn dispatch(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Run(args) => run::handle(args).await,
        Command::Stats(args) => stats::handle(args).await,
    }
}
