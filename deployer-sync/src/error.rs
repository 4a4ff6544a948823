//! Error types for deployer-sync.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while cloning or updating a working copy.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Clone failed: authentication, network or an unreachable remote.
    #[error("failed to clone {url}: {source}")]
    Clone {
        url: String,
        #[source]
        source: git2::Error,
    },

    /// Fetching the tracked branch failed.
    #[error("failed to fetch branch '{branch}' from {url}: {source}")]
    Fetch {
        url: String,
        branch: String,
        #[source]
        source: git2::Error,
    },

    /// Any other libgit2 failure.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The working copy has another branch checked out.
    #[error("working copy is on '{found}', expected '{expected}'")]
    BranchMismatch { expected: String, found: String },

    /// Local and remote histories diverged; a fast-forward is impossible.
    #[error("cannot fast-forward '{branch}' from {local} to {remote}; manual merge required")]
    Diverged {
        branch: String,
        local: String,
        remote: String,
    },

    /// Local changes to tracked files collide with the incoming update.
    #[error("update of '{branch}' conflicts with local changes: {message}")]
    Conflict { branch: String, message: String },

    /// A reference the update depends on does not exist.
    #[error("reference '{reference}' not found")]
    MissingRef { reference: String },
}

/// A post-sync command could not be run or exited unsuccessfully.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command is empty")]
    Empty,

    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with {}: {stderr}", exit_label(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
