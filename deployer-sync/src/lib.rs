//! # deployer-sync
//!
//! Repository Sync Engine and the blocking collaborators it needs.
//!
//! Call [`ensure_cloned`] before touching a working copy, then [`synchronize`]
//! to bring it up to date with its remote while keeping untracked files.
//! [`run_commands`] executes the post-sync steps of a repository.

pub mod auth;
pub mod commands;
pub mod engine;
pub mod error;
mod staging;

pub use commands::{run_command, run_commands, CommandOutput};
pub use engine::{ensure_cloned, synchronize, try_synchronize, CloneStatus, SyncOutcome};
pub use error::{CommandError, SyncError};
