//! Mode Controller: exactly one of the webhook listener or the cron scheduler
//! runs at a time.
//!
//! Switching is stop-then-start. Stopping signals the active task, waits for
//! it (bounded by the grace period) and then waits, with the same bound, for
//! any activity it already accepted. Accepted work is never aborted: webhook
//! deploys and scheduler ticks run in their own tasks holding their token.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use deployer_core::TriggerMode;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::barrier::ActivityToken;
use crate::error::ModeError;
use crate::state::AgentState;
use crate::webhook;

/// Parameters of the mode to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeSpec {
    Listener { port: u16 },
    Scheduler { expression: String },
}

impl ModeSpec {
    pub fn from_trigger(trigger: &TriggerMode, port: u16) -> Self {
        match trigger {
            TriggerMode::Push => ModeSpec::Listener { port },
            TriggerMode::Scheduled { expression } => ModeSpec::Scheduler {
                expression: expression.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeState {
    Stopped,
    /// `port` is the bound port (differs from the requested one for port 0).
    ListenerActive { port: u16 },
    SchedulerActive { expression: String },
}

impl fmt::Display for ModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeState::Stopped => write!(f, "stopped"),
            ModeState::ListenerActive { port } => write!(f, "listener on port {port}"),
            ModeState::SchedulerActive { expression } => write!(f, "scheduler ({expression})"),
        }
    }
}

struct Active {
    state: ModeState,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct ModeController {
    agent: AgentState,
    grace: Duration,
    active: Mutex<Option<Active>>,
    // Serializes apply/stop so two transitions never interleave.
    transitions: tokio::sync::Mutex<()>,
}

impl ModeController {
    pub fn new(agent: AgentState, grace: Duration) -> Self {
        Self {
            agent,
            grace,
            active: Mutex::new(None),
            transitions: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> ModeState {
        self.slot()
            .as_ref()
            .map(|active| active.state.clone())
            .unwrap_or(ModeState::Stopped)
    }

    /// Stop the current mode, then start `spec`. On error the controller is
    /// left stopped.
    pub async fn apply(&self, spec: ModeSpec) -> Result<(), ModeError> {
        let _serial = self.transitions.lock().await;
        self.stop_active().await;

        let active = match spec {
            ModeSpec::Listener { port } => self.start_listener(port).await?,
            ModeSpec::Scheduler { expression } => self.start_scheduler(expression)?,
        };
        tracing::info!(mode = %active.state, "trigger mode started");
        *self.slot() = Some(active);
        Ok(())
    }

    pub async fn stop(&self) {
        let _serial = self.transitions.lock().await;
        self.stop_active().await;
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Active>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn stop_active(&self) {
        // Taken out of the lock before any await.
        let taken = self.slot().take();
        let Some(active) = taken else {
            return;
        };
        let Active {
            state,
            stop,
            mut task,
        } = active;

        let _ = stop.send(());
        if tokio::time::timeout(self.grace, &mut task).await.is_err() {
            tracing::warn!(mode = %state, grace = ?self.grace, "mode did not stop in time; aborting");
            task.abort();
        }
        if tokio::time::timeout(self.grace, self.agent.barrier.idle())
            .await
            .is_err()
        {
            tracing::warn!(
                mode = %state,
                active = self.agent.barrier.state().active,
                "accepted work still running after grace period",
            );
        }
        tracing::info!(mode = %state, "trigger mode stopped");
    }

    async fn start_listener(&self, port: u16) -> Result<Active, ModeError> {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
            .await
            .map_err(|source| ModeError::Bind { port, source })?;
        let bound = listener
            .local_addr()
            .map_err(|source| ModeError::Bind { port, source })?;

        let app = webhook::router(self.agent.clone());
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = stopped.await;
                })
                .await;
            if let Err(err) = served {
                tracing::error!(error = %err, "webhook listener failed");
            }
        });

        Ok(Active {
            state: ModeState::ListenerActive {
                port: bound.port(),
            },
            stop,
            task,
        })
    }

    fn start_scheduler(&self, expression: String) -> Result<Active, ModeError> {
        let schedule = Schedule::from_str(&expression).map_err(|err| ModeError::Schedule {
            expression: expression.clone(),
            message: err.to_string(),
        })?;

        let agent = self.agent.clone();
        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(run_scheduler(schedule, agent, stopped));

        Ok(Active {
            state: ModeState::SchedulerActive { expression },
            stop,
            task,
        })
    }
}

async fn run_scheduler(schedule: Schedule, agent: AgentState, mut stopped: oneshot::Receiver<()>) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            tracing::warn!("schedule has no upcoming fire time; scheduler idle");
            let _ = stopped.await;
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = &mut stopped => return,
            _ = tokio::time::sleep(wait) => {}
        }
        let token = tokio::select! {
            _ = &mut stopped => return,
            token = agent.barrier.acquire() => token,
        };
        // The tick owns its token. Stopping ends this loop; a running tick
        // keeps the barrier busy until its commands finish.
        let tick = tokio::spawn(run_tick(agent.clone(), token));
        tokio::select! {
            _ = &mut stopped => return,
            _ = tick => {}
        }
    }
}

async fn run_tick(agent: AgentState, token: ActivityToken) {
    let snapshot = agent.settings.load().await;
    tracing::debug!(
        repositories = snapshot.repositories.len(),
        generation = token.generation(),
        "scheduled sync",
    );
    let reports = agent.deployer.deploy_all(snapshot).await;
    let failed = reports.iter().filter(|(_, report)| report.is_failure()).count();
    tracing::info!(repositories = reports.len(), failed, "scheduled sync finished");
    drop(token);
}
