//! Trigger → sync → post-sync commands, for one repository at a time.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use deployer_core::{Credentials, RepoName, RepositoryDescriptor, Secrets, SettingsSnapshot};
use deployer_sync::{ensure_cloned, run_commands, synchronize, CloneStatus, SyncOutcome};
use tokio::task::JoinSet;

use crate::store::SettingsStore;

/// Per-attempt outcome reported for observability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployReport {
    /// Working copy already current; no commands ran.
    NoOp,
    /// Working copy changed and every command succeeded.
    CommandsOk { ran: usize },
    /// Working copy changed and a command failed; the rest were skipped.
    CommandsFailed { error: String },
    /// Clone or fetch/update failed; retried on the next trigger.
    SyncFailed { reason: String },
}

impl DeployReport {
    pub fn label(&self) -> &'static str {
        match self {
            DeployReport::NoOp => "no-op",
            DeployReport::CommandsOk { .. } => "updated+commands-ok",
            DeployReport::CommandsFailed { .. } => "updated+commands-failed",
            DeployReport::SyncFailed { .. } => "sync-failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DeployReport::CommandsFailed { .. } | DeployReport::SyncFailed { .. }
        )
    }
}

impl fmt::Display for DeployReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone)]
pub struct Deployer {
    inner: Arc<Inner>,
}

struct Inner {
    secrets: SettingsStore<Secrets>,
    // One async lock per working copy path.
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    attempts: AtomicU64,
}

impl Deployer {
    pub fn new(secrets: SettingsStore<Secrets>) -> Self {
        Self {
            inner: Arc::new(Inner {
                secrets,
                locks: Mutex::new(HashMap::new()),
                attempts: AtomicU64::new(0),
            }),
        }
    }

    /// Number of deploy attempts started so far.
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Clone or update `name` from `snapshot` and run its commands if anything changed.
    ///
    /// The caller is expected to hold an activity token for the duration.
    pub async fn deploy(&self, snapshot: Arc<SettingsSnapshot>, name: &RepoName) -> DeployReport {
        let Some(repo) = snapshot.repositories.get(name).cloned() else {
            tracing::warn!(repo = %name, "deploy requested for unknown repository");
            return DeployReport::SyncFailed {
                reason: format!("repository '{name}' is not configured"),
            };
        };
        self.inner.attempts.fetch_add(1, Ordering::SeqCst);

        // Held until the blocking work ends, even if this future is dropped.
        let serial = self.lock_for(&repo.path).lock_owned().await;

        let credentials = snapshot.credentials.clone();
        let vars = self.inner.secrets.load().await.vars.clone();
        let report = tokio::task::spawn_blocking(move || {
            let _serial = serial;
            deploy_blocking(&repo, &credentials, &vars)
        })
        .await
        .unwrap_or_else(|err| DeployReport::SyncFailed {
            reason: format!("deploy task join error: {err}"),
        });

        match &report {
            DeployReport::NoOp => tracing::debug!(repo = %name, outcome = %report, "deploy finished"),
            DeployReport::CommandsOk { ran } => {
                tracing::info!(repo = %name, outcome = %report, commands = ran, "deploy finished")
            }
            DeployReport::CommandsFailed { error } => {
                tracing::error!(repo = %name, outcome = %report, error = %error, "deploy finished")
            }
            DeployReport::SyncFailed { reason } => {
                tracing::error!(repo = %name, outcome = %report, error = %reason, "deploy finished")
            }
        }
        report
    }

    /// Deploy `names` concurrently, returning reports in name order.
    pub async fn deploy_many(
        &self,
        snapshot: Arc<SettingsSnapshot>,
        names: Vec<RepoName>,
    ) -> Vec<(RepoName, DeployReport)> {
        let mut tasks = JoinSet::new();
        for name in names {
            let deployer = self.clone();
            let snapshot = snapshot.clone();
            tasks.spawn(async move {
                let report = deployer.deploy(snapshot, &name).await;
                (name, report)
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => reports.push(entry),
                Err(err) => tracing::error!(error = %err, "deploy task join failure"),
            }
        }
        reports.sort_by(|a, b| a.0.cmp(&b.0));
        reports
    }

    /// Deploy every repository of `snapshot`.
    pub async fn deploy_all(&self, snapshot: Arc<SettingsSnapshot>) -> Vec<(RepoName, DeployReport)> {
        let names = snapshot.repositories.keys().cloned().collect();
        self.deploy_many(snapshot, names).await
    }

    fn lock_for(&self, path: &std::path::Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .inner
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(path.to_path_buf()).or_default().clone()
    }
}

fn deploy_blocking(
    repo: &RepositoryDescriptor,
    credentials: &Credentials,
    vars: &BTreeMap<String, String>,
) -> DeployReport {
    let changed = match ensure_cloned(repo, credentials) {
        Ok(CloneStatus::Cloned) => true,
        Ok(CloneStatus::Present) => match synchronize(repo, credentials) {
            SyncOutcome::NoChange => false,
            SyncOutcome::Updated { .. } => true,
            SyncOutcome::Failed(reason) => return DeployReport::SyncFailed { reason },
        },
        Err(err) => {
            return DeployReport::SyncFailed {
                reason: err.to_string(),
            }
        }
    };
    if !changed {
        return DeployReport::NoOp;
    }

    match run_commands(&repo.commands, &repo.path, vars) {
        Ok(outputs) => DeployReport::CommandsOk { ran: outputs.len() },
        Err(err) => DeployReport::CommandsFailed {
            error: err.to_string(),
        },
    }
}
