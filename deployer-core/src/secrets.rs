//! Secrets (dotenv) file parsing.
//!
//! Recognised keys: `PORT` (default 8080), `LOG_LEVEL` (required) and
//! `GITHUB_WEBHOOK_SECRET` (optional). Every pair in the file is kept in
//! [`Secrets::vars`] so post-sync commands see the same environment.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::SettingsError;
use crate::types::{LogLevel, Secrets};

pub const DEFAULT_PORT: u16 = 8080;

/// Parse and validate the raw bytes of a secrets file.
pub fn parse_secrets(bytes: &[u8]) -> Result<Secrets, SettingsError> {
    let mut vars = BTreeMap::new();
    for item in dotenvy::from_read_iter(bytes) {
        let (key, value) = item?;
        vars.insert(key, value);
    }

    let port = match vars.get("PORT").map(|p| p.trim()).filter(|p| !p.is_empty()) {
        None => DEFAULT_PORT,
        Some(raw) => raw
            .parse::<u16>()
            .map_err(|_| SettingsError::invalid(format!("PORT '{raw}' is not a valid port")))?,
    };

    let log_level = vars
        .get("LOG_LEVEL")
        .filter(|level| !level.trim().is_empty())
        .ok_or_else(|| SettingsError::invalid("LOG_LEVEL env variable is required"))?
        .parse::<LogLevel>()
        .map_err(SettingsError::Invalid)?;

    let webhook_secret = vars
        .get("GITHUB_WEBHOOK_SECRET")
        .filter(|secret| !secret.is_empty())
        .cloned();

    Ok(Secrets {
        port,
        log_level,
        webhook_secret,
        vars,
    })
}

/// Read and parse a secrets file from disk.
pub fn load_secrets(path: &Path) -> Result<Secrets, SettingsError> {
    let bytes = std::fs::read(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_secrets(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_port_and_keeps_all_vars() {
        let secrets = parse_secrets(b"LOG_LEVEL=debug\nDEPLOY_TOKEN=abc\n").expect("parse");
        assert_eq!(secrets.port, DEFAULT_PORT);
        assert_eq!(secrets.log_level, LogLevel::Debug);
        assert_eq!(secrets.webhook_secret, None);
        assert_eq!(secrets.vars.get("DEPLOY_TOKEN").map(String::as_str), Some("abc"));
    }

    #[test]
    fn quoted_values_and_comments() {
        let secrets = parse_secrets(
            b"# agent secrets\nPORT=9000\nLOG_LEVEL=\"0\"\nGITHUB_WEBHOOK_SECRET='s3cr3t'\n",
        )
        .expect("parse");
        assert_eq!(secrets.port, 9000);
        assert_eq!(secrets.log_level, LogLevel::Info);
        assert_eq!(secrets.webhook_secret.as_deref(), Some("s3cr3t"));
    }

    #[test]
    fn missing_log_level_is_rejected() {
        let err = parse_secrets(b"PORT=9000\n").unwrap_err();
        assert!(err.to_string().contains("LOG_LEVEL"), "got: {err}");
    }

    #[test]
    fn bad_port_is_rejected() {
        let err = parse_secrets(b"PORT=http\nLOG_LEVEL=info\n").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)), "got: {err}");
    }
}
