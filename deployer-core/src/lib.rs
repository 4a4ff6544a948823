//! Deployer core library: domain types, settings and secrets parsing, errors.
//!
//! - [`types`]: repository descriptors, settings snapshot, secrets
//! - [`settings`]: settings file (YAML) parsing and validation
//! - [`secrets`]: secrets file (dotenv) parsing
//! - [`error`]: [`SettingsError`]

pub mod error;
pub mod secrets;
pub mod settings;
pub mod types;

pub use error::SettingsError;
pub use secrets::{load_secrets, parse_secrets};
pub use settings::{load_settings, parse_settings};
pub use types::{
    Credentials, LogLevel, RepoName, RepositoryDescriptor, Secrets, SettingsSnapshot, TriggerMode,
};
