//! Reconfiguration Orchestrator.
//!
//! Both reload paths run the same critical section: drain the activity
//! barrier, parse the file, re-derive the trigger mode where needed, publish
//! the new snapshot, then re-open the barrier. Any error inside that section
//! is returned as [`DaemonError::Reconfigure`], which the runtime treats as
//! fatal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use deployer_core::{parse_secrets, parse_settings, RepoName};
use tokio::sync::Mutex;

use crate::error::DaemonError;
use crate::logging::LogHandle;
use crate::mode::{ModeController, ModeSpec, ModeState};
use crate::state::AgentState;

/// What a settings reload changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsReload {
    /// The trigger mode (or its schedule) differed and the mode was restarted.
    pub mode_changed: bool,
    /// Repositories added or modified by the reload.
    pub changed_repositories: Vec<RepoName>,
}

/// What a secrets reload changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretsReload {
    pub listener_restarted: bool,
    pub level_changed: bool,
}

pub struct Reconfigurator {
    config_path: PathBuf,
    env_path: PathBuf,
    agent: AgentState,
    mode: Arc<ModeController>,
    logging: LogHandle,
    // One reload at a time, across both files.
    serial: Mutex<()>,
}

impl Reconfigurator {
    pub fn new(
        config_path: PathBuf,
        env_path: PathBuf,
        agent: AgentState,
        mode: Arc<ModeController>,
        logging: LogHandle,
    ) -> Self {
        Self {
            config_path,
            env_path,
            agent,
            mode,
            logging,
            serial: Mutex::new(()),
        }
    }

    /// Apply the settings file as it is on disk now.
    pub async fn apply_settings_change(&self) -> Result<SettingsReload, DaemonError> {
        let _serial = self.serial.lock().await;
        let guard = self.agent.barrier.drain().await;
        tracing::info!(path = %self.config_path.display(), "settings changed; in-flight work drained");

        let bytes = read(&self.config_path).await?;
        let next = parse_settings(&bytes)
            .map_err(|err| DaemonError::Reconfigure(format!("settings file: {err}")))?;
        let previous = self.agent.settings.load().await;

        let mode_changed = previous.trigger != next.trigger;
        if mode_changed {
            tracing::info!(from = %previous.trigger, to = %next.trigger, "trigger mode changed");
            let port = self.agent.secrets.load().await.port;
            self.mode
                .apply(ModeSpec::from_trigger(&next.trigger, port))
                .await
                .map_err(|err| DaemonError::Reconfigure(format!("trigger mode: {err}")))?;
        }

        let changed_repositories = next.changed_since(&previous);
        self.agent.settings.publish(next).await;
        drop(guard);

        tracing::info!(
            mode_changed,
            changed = changed_repositories.len(),
            "settings reloaded",
        );
        Ok(SettingsReload {
            mode_changed,
            changed_repositories,
        })
    }

    /// Apply the secrets file as it is on disk now.
    pub async fn apply_secrets_change(&self) -> Result<SecretsReload, DaemonError> {
        let _serial = self.serial.lock().await;
        let guard = self.agent.barrier.drain().await;
        tracing::info!(path = %self.env_path.display(), "secrets changed; in-flight work drained");

        let bytes = read(&self.env_path).await?;
        let next = parse_secrets(&bytes)
            .map_err(|err| DaemonError::Reconfigure(format!("secrets file: {err}")))?;
        let previous = self.agent.secrets.load().await;

        let mut report = SecretsReload::default();
        let listening = matches!(self.mode.state(), ModeState::ListenerActive { .. });
        if previous.port != next.port && listening {
            tracing::info!(from = previous.port, to = next.port, "listen port changed");
            self.mode
                .apply(ModeSpec::Listener { port: next.port })
                .await
                .map_err(|err| DaemonError::Reconfigure(format!("listener restart: {err}")))?;
            report.listener_restarted = true;
        }
        if previous.log_level != next.log_level {
            self.logging.set_level(next.log_level);
            report.level_changed = true;
        }
        if previous.webhook_secret.is_some() && next.webhook_secret.is_none() {
            tracing::warn!("GITHUB_WEBHOOK_SECRET removed; webhook signatures are no longer verified");
        }

        self.agent.secrets.publish(next).await;
        drop(guard);
        tracing::info!(?report, "secrets reloaded");
        Ok(report)
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, DaemonError> {
    tokio::fs::read(path)
        .await
        .map_err(|err| DaemonError::Reconfigure(format!("failed to read {}: {err}", path.display())))
}
