use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use deployer_core::{load_secrets, load_settings};
use tokio::sync::broadcast;

use crate::error::{io_err, DaemonError};
use crate::logging::init_tracing;
use crate::mode::{ModeController, ModeSpec};
use crate::paths::{default_config_path, default_env_path, MODE_STOP_GRACE, SHUTDOWN_GRACE};
use crate::reconfigure::Reconfigurator;
use crate::state::AgentState;
use crate::watch::{FileWatch, WatchEvent};

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub config_path: PathBuf,
    pub env_path: PathBuf,
    /// Bound on waiting for in-flight syncs at shutdown.
    pub shutdown_grace: Duration,
    /// Bound on waiting for accepted work when a trigger mode stops.
    pub mode_grace: Duration,
    pub json_logs: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            env_path: default_env_path(),
            shutdown_grace: SHUTDOWN_GRACE,
            mode_grace: MODE_STOP_GRACE,
            json_logs: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum WatchedFile {
    Settings,
    Secrets,
}

/// Start the agent and block the current thread until it exits.
pub fn start_blocking(options: RuntimeOptions) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(options))
}

/// Run the agent until SIGINT/SIGTERM or a fatal error.
pub async fn run(options: RuntimeOptions) -> Result<(), DaemonError> {
    run_until(options, wait_for_signal()).await
}

/// Run the agent until `stop` resolves or a fatal error occurs.
pub async fn run_until<F>(options: RuntimeOptions, stop: F) -> Result<(), DaemonError>
where
    F: Future<Output = Result<(), DaemonError>> + Send + 'static,
{
    let settings = load_settings(&options.config_path)?;
    let secrets = load_secrets(&options.env_path)?;
    let logging = init_tracing(secrets.log_level, options.json_logs);
    if secrets.webhook_secret.is_none() {
        tracing::warn!("GITHUB_WEBHOOK_SECRET not set; webhook signatures are not verified");
    }

    let port = secrets.port;
    let trigger = settings.trigger.clone();
    let agent = AgentState::new(settings, secrets);
    let mode = Arc::new(ModeController::new(agent.clone(), options.mode_grace));
    let reconfigurator = Arc::new(Reconfigurator::new(
        options.config_path.clone(),
        options.env_path.clone(),
        agent.clone(),
        mode.clone(),
        logging,
    ));

    let settings_watch = FileWatch::new(&options.config_path)?;
    let secrets_watch = FileWatch::new(&options.env_path)?;

    {
        let token = agent.barrier.acquire().await;
        let snapshot = agent.settings.load().await;
        tracing::info!(repositories = snapshot.repositories.len(), "bootstrapping repositories");
        agent.deployer.deploy_all(snapshot).await;
        drop(token);
    }

    mode.apply(ModeSpec::from_trigger(&trigger, port)).await?;

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let settings_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let reconfigurator = reconfigurator.clone();
        let agent = agent.clone();
        tokio::spawn(async move {
            let result = watch_task(
                settings_watch,
                WatchedFile::Settings,
                reconfigurator,
                agent,
                shutdown_rx,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let secrets_handle = {
        let shutdown = shutdown_tx.clone();
        let shutdown_rx = shutdown.subscribe();
        let reconfigurator = reconfigurator.clone();
        let agent = agent.clone();
        tokio::spawn(async move {
            let result = watch_task(
                secrets_watch,
                WatchedFile::Secrets,
                reconfigurator,
                agent,
                shutdown_rx,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                requested = stop => {
                    let _ = shutdown.send(());
                    requested
                }
            }
        })
    };

    let (settings_result, secrets_result, signal_result) =
        tokio::join!(settings_handle, secrets_handle, signal_handle);

    tracing::info!("shutting down");
    mode.stop().await;
    let _drain = agent.barrier.begin_drain().await;
    if tokio::time::timeout(options.shutdown_grace, agent.barrier.idle())
        .await
        .is_err()
    {
        tracing::warn!(
            abandoned = agent.barrier.state().active,
            "shutdown grace elapsed; abandoning in-flight work",
        );
    }

    handle_join("settings_watcher", settings_result)?;
    handle_join("secrets_watcher", secrets_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

async fn watch_task(
    mut watch: FileWatch,
    file: WatchedFile,
    reconfigurator: Arc<Reconfigurator>,
    agent: AgentState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        let event = tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = watch.next() => event,
        };

        let generation = match event {
            Some(WatchEvent::Changed { generation }) => generation,
            Some(WatchEvent::Lost) | None => {
                let err = DaemonError::WatchLost {
                    path: watch.path().to_path_buf(),
                };
                tracing::error!(error = %err, "fatal: watched file lost");
                return Err(err);
            }
        };
        tracing::debug!(?file, generation, "applying change");

        // Shutdown preempts a reload still waiting in its drain.
        let outcome = tokio::select! {
            _ = shutdown_rx.recv() => {
                tracing::info!(?file, "reload abandoned for shutdown");
                break;
            }
            outcome = reload(&reconfigurator, &agent, file) => outcome,
        };
        if let Err(err) = outcome {
            tracing::error!(error = %err, "fatal: reconfiguration failed");
            return Err(err);
        }
    }
    Ok(())
}

async fn reload(
    reconfigurator: &Reconfigurator,
    agent: &AgentState,
    file: WatchedFile,
) -> Result<(), DaemonError> {
    match file {
        WatchedFile::Settings => reconfigurator
            .apply_settings_change()
            .await
            .map(|reload| bootstrap_changed(agent, reload.changed_repositories)),
        WatchedFile::Secrets => reconfigurator.apply_secrets_change().await.map(|_| ()),
    }
}

/// Sync repositories added or changed by a settings reload, in the background.
fn bootstrap_changed(agent: &AgentState, names: Vec<deployer_core::RepoName>) {
    if names.is_empty() {
        return;
    }
    let agent = agent.clone();
    tokio::spawn(async move {
        let token = agent.barrier.acquire().await;
        let snapshot = agent.settings.load().await;
        agent.deployer.deploy_many(snapshot, names).await;
        drop(token);
    });
}

async fn wait_for_signal() -> Result<(), DaemonError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;
        tokio::select! {
            received = tokio::signal::ctrl_c() => {
                received.map_err(|e| io_err("ctrl-c handler", e))?;
                tracing::info!("received ctrl-c");
            }
            _ = terminate.recv() => tracing::info!("received SIGTERM"),
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| io_err("ctrl-c handler", e))?;
        tracing::info!("received ctrl-c");
        Ok(())
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Task(format!(
            "{task} task join failure: {err}"
        ))),
    }
}
