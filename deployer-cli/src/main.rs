//! Deployer: keep repository checkouts in sync and run their deploy commands.
//!
//! # Usage
//!
//! ```text
//! deployer run   [--config config.yaml] [--env .env] [--shutdown-grace <secs>] [--json-logs]
//! deployer check [--config config.yaml] [--env .env] [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{check::CheckArgs, run::RunArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "deployer",
    version,
    about = "Continuous-deployment agent: sync repositories on push or schedule and run deploy commands",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the agent in the foreground until interrupted.
    Run(RunArgs),

    /// Validate the settings and secrets files and print a summary.
    Check(CheckArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => args.run(),
        Commands::Check(args) => args.run(),
    }
}
