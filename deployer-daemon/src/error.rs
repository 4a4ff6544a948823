use std::path::PathBuf;

use thiserror::Error;

/// Failure to bring a trigger mode up.
#[derive(Debug, Error)]
pub enum ModeError {
    #[error("failed to bind webhook listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid schedule expression '{expression}': {message}")]
    Schedule { expression: String, message: String },
}

/// Error surface for the agent runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("settings error: {0}")]
    Settings(#[from] deployer_core::SettingsError),

    #[error("mode error: {0}")]
    Mode(#[from] ModeError),

    /// A reload failed inside the drain window. Always fatal.
    #[error("reconfiguration failed: {0}")]
    Reconfigure(String),

    #[error("watched file {path} was removed or renamed")]
    WatchLost { path: PathBuf },

    #[error("{path} is not a watchable file")]
    NotAFile { path: PathBuf },

    #[error("{0}")]
    Task(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
