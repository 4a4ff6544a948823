//! Tracing setup with a reloadable level filter.

use std::sync::{Arc, Mutex};

use deployer_core::LogLevel;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Adjusts the installed filter when the secrets file changes `LOG_LEVEL`.
#[derive(Clone)]
pub struct LogHandle {
    // `None` when another subscriber was already installed.
    reload: Option<reload::Handle<EnvFilter, Registry>>,
    level: Arc<Mutex<LogLevel>>,
}

impl LogHandle {
    /// A handle that only records the level, for callers that install no subscriber.
    pub fn detached(level: LogLevel) -> Self {
        Self {
            reload: None,
            level: Arc::new(Mutex::new(level)),
        }
    }

    pub fn level(&self) -> LogLevel {
        *self.level.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_level(&self, level: LogLevel) {
        if let Some(handle) = &self.reload {
            if let Err(err) = handle.reload(EnvFilter::new(level.as_directive())) {
                tracing::warn!(error = %err, "failed to apply new log level");
                return;
            }
        }
        *self.level.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = level;
        tracing::info!(level = %level, "log level changed");
    }
}

/// Install the global subscriber. `RUST_LOG`, when set, wins over `level`.
pub fn init_tracing(level: LogLevel, json: bool) -> LogHandle {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_directive()));
    let (filter, handle) = reload::Layer::new(filter);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer().with_target(false)))
        .try_init()
        .is_ok();

    LogHandle {
        reload: installed.then_some(handle),
        level: Arc::new(Mutex::new(level)),
    }
}
