//! `deployer check`: validate both files without starting the agent.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use deployer_core::{load_secrets, load_settings, Secrets, SettingsSnapshot};
use deployer_daemon::paths::{DEFAULT_CONFIG_FILE, DEFAULT_ENV_FILE};

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Settings file (repositories, trigger mode).
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Secrets file (PORT, LOG_LEVEL, GITHUB_WEBHOOK_SECRET).
    #[arg(long, default_value = DEFAULT_ENV_FILE)]
    pub env: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl CheckArgs {
    pub fn run(self) -> Result<()> {
        let settings = load_settings(&self.config)
            .with_context(|| format!("invalid settings file {}", self.config.display()))?;
        let secrets = load_secrets(&self.env)
            .with_context(|| format!("invalid secrets file {}", self.env.display()))?;

        let report = CheckReport::new(&settings, &secrets);
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to render check JSON")?
            );
            return Ok(());
        }

        print_report(&report);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CheckReport {
    mode: &'static str,
    schedule: Option<String>,
    port: u16,
    log_level: String,
    signatures_verified: bool,
    repositories: Vec<RepositoryRow>,
}

#[derive(Debug, Serialize, Tabled)]
struct RepositoryRow {
    #[tabled(rename = "repository")]
    name: String,
    #[tabled(rename = "branch")]
    branch: String,
    #[tabled(rename = "path")]
    path: String,
    #[tabled(rename = "url")]
    url: String,
    #[tabled(rename = "commands")]
    commands: usize,
}

impl CheckReport {
    fn new(settings: &SettingsSnapshot, secrets: &Secrets) -> Self {
        let repositories = settings
            .repositories
            .iter()
            .map(|(name, repo)| RepositoryRow {
                name: name.to_string(),
                branch: repo.branch.clone(),
                path: repo.path.display().to_string(),
                url: repo.url.clone(),
                commands: repo.commands.len(),
            })
            .collect();

        Self {
            mode: if settings.trigger.is_scheduled() {
                "scheduled"
            } else {
                "push"
            },
            schedule: settings.trigger.schedule().map(str::to_string),
            port: secrets.port,
            log_level: secrets.log_level.to_string(),
            signatures_verified: secrets.webhook_secret.is_some(),
            repositories,
        }
    }
}

fn print_report(report: &CheckReport) {
    println!("{} settings and secrets are valid", "✓".green().bold());
    match &report.schedule {
        Some(schedule) => println!("{} scheduled ({schedule})", "mode:".bold()),
        None => println!("{} push (webhook on port {})", "mode:".bold(), report.port),
    }
    println!("{} {}", "log level:".bold(), report.log_level);
    if !report.signatures_verified {
        println!(
            "{}",
            "warning: GITHUB_WEBHOOK_SECRET not set; webhook signatures are not verified".yellow()
        );
    }

    let mut table = Table::new(&report.repositories);
    table.with(Style::rounded());
    println!("{table}");
}
