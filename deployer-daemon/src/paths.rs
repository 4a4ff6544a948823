use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Quiet period a watched file must observe before a change is reported.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// How long a mode stop waits for accepted work before forcing closure.
pub const MODE_STOP_GRACE: Duration = Duration::from_secs(10);

/// How long process shutdown waits for in-flight syncs.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}

pub fn default_env_path() -> PathBuf {
    PathBuf::from(DEFAULT_ENV_FILE)
}
