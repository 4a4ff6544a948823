//! Settings file parsing and validation.
//!
//! # File layout
//!
//! ```yaml
//! preference:
//!   private_key: /home/deploy/.ssh/id_ed25519
//!   passphrase: ""
//!   cron: true
//!   spec: "*/30 * * * * *"
//! repositories:
//!   svc-a:
//!     url: https://github.com/org/svc-a
//!     clone: git@github.com:org/svc-a.git
//!     branch: main
//!     path: /srv/svc-a
//!     commands: ["make build"]
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::SettingsError;
use crate::types::{Credentials, RepoName, RepositoryDescriptor, SettingsSnapshot, TriggerMode};

#[derive(Debug, Deserialize)]
struct RawSettings {
    #[serde(default)]
    preference: RawPreference,
    #[serde(default)]
    repositories: BTreeMap<String, RawRepository>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPreference {
    #[serde(default)]
    private_key: Option<PathBuf>,
    #[serde(default, alias = "paraphrase")]
    passphrase: Option<String>,
    #[serde(default)]
    cron: bool,
    #[serde(default)]
    spec: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    #[serde(default)]
    url: String,
    #[serde(default)]
    clone: String,
    #[serde(default)]
    branch: String,
    #[serde(default)]
    path: PathBuf,
    #[serde(default)]
    commands: Vec<String>,
}

/// Parse and validate the raw bytes of a settings file.
pub fn parse_settings(bytes: &[u8]) -> Result<SettingsSnapshot, SettingsError> {
    let raw: RawSettings = serde_yaml::from_slice(bytes)?;

    if raw.repositories.is_empty() {
        return Err(SettingsError::invalid("no repositories configured"));
    }

    let trigger = if raw.preference.cron {
        let expression = raw
            .preference
            .spec
            .as_deref()
            .map(str::trim)
            .filter(|spec| !spec.is_empty())
            .ok_or_else(|| SettingsError::invalid("schedule required when polling enabled"))?;
        cron::Schedule::from_str(expression).map_err(|err| {
            SettingsError::invalid(format!("invalid schedule expression '{expression}': {err}"))
        })?;
        TriggerMode::Scheduled {
            expression: expression.to_string(),
        }
    } else {
        TriggerMode::Push
    };

    let credentials = Credentials {
        private_key: raw
            .preference
            .private_key
            .filter(|path| !path.as_os_str().is_empty()),
        passphrase: raw.preference.passphrase.filter(|p| !p.is_empty()),
    };

    let mut repositories = BTreeMap::new();
    let mut seen_paths: HashMap<PathBuf, String> = HashMap::new();
    for (name, repo) in raw.repositories {
        let descriptor = validate_repository(&name, repo)?;
        if let Some(other) = seen_paths.insert(descriptor.path.clone(), name.clone()) {
            return Err(SettingsError::invalid(format!(
                "repository '{other}' and '{name}' share path {}",
                descriptor.path.display()
            )));
        }
        repositories.insert(RepoName::from(name), descriptor);
    }

    Ok(SettingsSnapshot {
        trigger,
        credentials,
        repositories,
    })
}

/// Read and parse a settings file from disk.
pub fn load_settings(path: &Path) -> Result<SettingsSnapshot, SettingsError> {
    let bytes = std::fs::read(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_settings(&bytes)
}

fn validate_repository(name: &str, raw: RawRepository) -> Result<RepositoryDescriptor, SettingsError> {
    let required = [
        ("url", raw.url.trim().is_empty()),
        ("clone", raw.clone.trim().is_empty()),
        ("branch", raw.branch.trim().is_empty()),
        ("path", raw.path.as_os_str().is_empty()),
    ];
    if let Some((field, _)) = required.iter().find(|(_, missing)| *missing) {
        return Err(SettingsError::invalid(format!(
            "repository '{name}': {field} must not be empty"
        )));
    }

    Ok(RepositoryDescriptor {
        url: raw.url.trim().to_string(),
        clone_url: raw.clone.trim().to_string(),
        branch: raw.branch.trim().to_string(),
        path: raw.path,
        commands: raw
            .commands
            .into_iter()
            .filter(|command| !command.trim().is_empty())
            .collect(),
    })
}
