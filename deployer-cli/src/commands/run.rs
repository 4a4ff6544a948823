//! `deployer run`: foreground agent.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use deployer_daemon::paths::{DEFAULT_CONFIG_FILE, DEFAULT_ENV_FILE, SHUTDOWN_GRACE};
use deployer_daemon::{start_blocking, RuntimeOptions};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Settings file (repositories, trigger mode).
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Secrets file (PORT, LOG_LEVEL, GITHUB_WEBHOOK_SECRET).
    #[arg(long, default_value = DEFAULT_ENV_FILE)]
    pub env: PathBuf,

    /// Seconds to wait for in-flight deploys on shutdown.
    #[arg(long, default_value_t = SHUTDOWN_GRACE.as_secs())]
    pub shutdown_grace: u64,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub json_logs: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let options = RuntimeOptions {
            config_path: self.config,
            env_path: self.env,
            shutdown_grace: Duration::from_secs(self.shutdown_grace),
            json_logs: self.json_logs,
            ..RuntimeOptions::default()
        };
        start_blocking(options).context("agent exited with error")
    }
}
