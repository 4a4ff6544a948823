//! Deployer agent runtime: trigger modes, live reconfiguration and shutdown.

pub mod barrier;
pub mod deploy;
mod error;
pub mod logging;
pub mod mode;
pub mod paths;
pub mod reconfigure;
mod runtime;
pub mod state;
pub mod store;
pub mod watch;
pub mod webhook;

pub use barrier::{ActivityBarrier, ActivityToken, BarrierState, DrainGuard};
pub use deploy::{DeployReport, Deployer};
pub use error::{DaemonError, ModeError};
pub use logging::{init_tracing, LogHandle};
pub use mode::{ModeController, ModeSpec, ModeState};
pub use reconfigure::{Reconfigurator, SecretsReload, SettingsReload};
pub use runtime::{run, run_until, start_blocking, RuntimeOptions};
pub use state::AgentState;
pub use store::SettingsStore;
pub use watch::{FileWatch, WatchEvent};
