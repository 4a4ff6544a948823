//! Error types for deployer-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading the settings or secrets files.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid YAML or has the wrong shape.
    #[error("failed to parse settings: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The secrets file is not valid dotenv syntax.
    #[error("failed to parse secrets: {0}")]
    Env(#[from] dotenvy::Error),

    /// The file parsed but its content is rejected.
    #[error("{0}")]
    Invalid(String),
}

impl SettingsError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}
