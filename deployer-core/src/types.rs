//! Domain types shared by the sync engine and the daemon.
//!
//! All path fields use `PathBuf`. Snapshots are immutable once built; a reload
//! produces a brand new value instead of mutating the current one.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Logical name of a repository entry in the settings file.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepoName(pub String);

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RepoName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RepoName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Repository + settings
// ---------------------------------------------------------------------------

/// One repository working copy managed by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryDescriptor {
    /// Remote URL used to match inbound push notifications.
    pub url: String,
    /// URL the working copy is cloned and fetched from.
    pub clone_url: String,
    pub branch: String,
    /// Local working copy root.
    pub path: PathBuf,
    /// Post-sync commands, run in order inside `path`.
    pub commands: Vec<String>,
}

/// How synchronization attempts are triggered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TriggerMode {
    /// Inbound push notifications over HTTP.
    Push,
    /// Periodic poll driven by a cron expression (seconds field first).
    Scheduled { expression: String },
}

impl TriggerMode {
    pub fn is_scheduled(&self) -> bool {
        matches!(self, TriggerMode::Scheduled { .. })
    }

    pub fn schedule(&self) -> Option<&str> {
        match self {
            TriggerMode::Push => None,
            TriggerMode::Scheduled { expression } => Some(expression),
        }
    }
}

impl fmt::Display for TriggerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerMode::Push => write!(f, "push"),
            TriggerMode::Scheduled { expression } => write!(f, "scheduled ({expression})"),
        }
    }
}

/// SSH key material used for clone and fetch.
///
/// When `private_key` is `None` the transport falls back to the SSH agent or
/// anonymous access.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub private_key: Option<PathBuf>,
    pub passphrase: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("private_key", &self.private_key)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Validated content of the settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsSnapshot {
    pub trigger: TriggerMode,
    pub credentials: Credentials,
    pub repositories: BTreeMap<RepoName, RepositoryDescriptor>,
}

impl SettingsSnapshot {
    /// Find the repository whose identity URL matches an inbound event.
    ///
    /// Trailing slashes are ignored on both sides.
    pub fn find_by_url(&self, url: &str) -> Option<(&RepoName, &RepositoryDescriptor)> {
        let wanted = url.trim_end_matches('/');
        self.repositories
            .iter()
            .find(|(_, repo)| repo.url.trim_end_matches('/') == wanted)
    }

    /// Names of repositories that are new in `self` or whose descriptor differs from `previous`.
    pub fn changed_since(&self, previous: &SettingsSnapshot) -> Vec<RepoName> {
        self.repositories
            .iter()
            .filter(|(name, repo)| previous.repositories.get(*name) != Some(*repo))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Secrets
// ---------------------------------------------------------------------------

/// Log verbosity threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_directive())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    /// Accepts level names and the legacy numeric levels (`-4` debug, `0` info,
    /// `4` warn, `8` error).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(number) = trimmed.parse::<i32>() {
            return Ok(match number {
                n if n < 0 => LogLevel::Debug,
                n if n < 4 => LogLevel::Info,
                n if n < 8 => LogLevel::Warn,
                _ => LogLevel::Error,
            });
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!(
                "unknown log level '{other}'; expected trace, debug, info, warn, error or a number"
            )),
        }
    }
}

/// Validated content of the secrets (environment) file.
#[derive(Clone, PartialEq, Eq)]
pub struct Secrets {
    pub port: u16,
    pub log_level: LogLevel,
    pub webhook_secret: Option<String>,
    /// Every key/value pair of the file, handed to post-sync commands.
    pub vars: BTreeMap<String, String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("vars", &self.vars.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
