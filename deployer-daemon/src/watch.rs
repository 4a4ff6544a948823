//! File Change Watcher.
//!
//! `notify` watches the parent directory of the target (non-recursively) so
//! editors that save through a temporary file and a rename are still seen.
//! Raw notifications for the target name are fed to a debounce task that
//! reports one [`WatchEvent::Changed`] per quiet period, or a terminal
//! [`WatchEvent::Lost`] when the file is gone once the burst settles.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::{io_err, DaemonError};
use crate::paths::DEBOUNCE_WINDOW;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// The file settled after one or more notifications. `generation` counts
    /// raw notifications seen so far, so a later event always carries a
    /// larger value.
    Changed { generation: u64 },
    /// The file was deleted or renamed away. No further events follow.
    Lost,
}

/// Debounced change stream for one file.
pub struct FileWatch {
    path: PathBuf,
    events: mpsc::UnboundedReceiver<WatchEvent>,
    _watcher: RecommendedWatcher,
}

impl FileWatch {
    /// Start watching `path`. The file must exist. Must be called inside a
    /// tokio runtime.
    pub fn new(path: &Path) -> Result<Self, DaemonError> {
        Self::with_window(path, DEBOUNCE_WINDOW)
    }

    pub fn with_window(path: &Path, window: Duration) -> Result<Self, DaemonError> {
        let path = fs::canonicalize(path).map_err(|e| io_err(path, e))?;
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| DaemonError::NotAFile { path: path.clone() })?;
        let name = path.file_name().map(|name| name.to_os_string());

        let (raw_tx, raw_rx) = mpsc::unbounded_channel::<()>();
        let mut watcher = recommended_watcher(move |event: notify::Result<Event>| match event {
            Ok(event) => {
                if is_relevant_event_kind(&event.kind)
                    && event.paths.iter().any(|p| p.file_name() == name.as_deref())
                {
                    let _ = raw_tx.send(());
                }
            }
            Err(err) => tracing::warn!(error = %err, "watcher event error"),
        })?;
        watcher.watch(&parent, RecursiveMode::NonRecursive)?;
        tracing::debug!(path = %path.display(), "watching file");

        let (events_tx, events) = mpsc::unbounded_channel();
        tokio::spawn(debounce(raw_rx, events_tx, path.clone(), window));

        Ok(Self {
            path,
            events,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Next logical event. `None` after [`WatchEvent::Lost`].
    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.events.recv().await
    }
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    !matches!(kind, EventKind::Access(_))
}

/// Coalesce raw notifications: each one bumps the generation and pushes the
/// deadline out by `window`. When the deadline passes the file is checked and
/// either `Changed` or the terminal `Lost` is emitted.
pub(crate) async fn debounce(
    mut raw: mpsc::UnboundedReceiver<()>,
    events: mpsc::UnboundedSender<WatchEvent>,
    path: PathBuf,
    window: Duration,
) {
    let mut generation = 0u64;
    let mut deadline: Option<Instant> = None;

    loop {
        let armed = deadline.is_some();
        let fire_at = deadline.unwrap_or_else(Instant::now);
        tokio::select! {
            received = raw.recv() => {
                let Some(()) = received else { break };
                generation += 1;
                deadline = Some(Instant::now() + window);
            }
            _ = tokio::time::sleep_until(fire_at), if armed => {
                deadline = None;
                if matches!(path.try_exists(), Ok(true)) {
                    tracing::debug!(path = %path.display(), generation, "file changed");
                    if events.send(WatchEvent::Changed { generation }).is_err() {
                        break;
                    }
                } else {
                    tracing::warn!(path = %path.display(), "watched file disappeared");
                    let _ = events.send(WatchEvent::Lost);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::time::{advance, timeout};

    fn spawn_debounce(path: PathBuf) -> (mpsc::UnboundedSender<()>, mpsc::UnboundedReceiver<WatchEvent>) {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(debounce(raw_rx, events_tx, path, DEBOUNCE_WINDOW));
        (raw_tx, events_rx)
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn burst_of_notifications_yields_one_event() {
        let dir = TempDir::new().expect("tempdir");
        let file = dir.path().join("config.yaml");
        fs::write(&file, "a: 1").expect("write");
        let (raw, mut events) = spawn_debounce(file);

        for _ in 0..5 {
            raw.send(()).expect("raw send");
            advance(Duration::from_millis(10)).await;
        }

        let started = Instant::now();
        assert_eq!(events.recv().await, Some(WatchEvent::Changed { generation: 5 }));
        assert!(started.elapsed() >= Duration::from_millis(90));
        assert!(timeout(Duration::from_secs(1), events.recv()).await.is_err());
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn separate_bursts_yield_increasing_generations() {
        let dir = TempDir::new().expect("tempdir");
        let file = dir.path().join(".env");
        fs::write(&file, "PORT=1").expect("write");
        let (raw, mut events) = spawn_debounce(file);

        raw.send(()).expect("raw send");
        assert_eq!(events.recv().await, Some(WatchEvent::Changed { generation: 1 }));

        advance(Duration::from_millis(500)).await;
        raw.send(()).expect("raw send");
        raw.send(()).expect("raw send");
        assert_eq!(events.recv().await, Some(WatchEvent::Changed { generation: 3 }));
    }

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn missing_file_after_burst_is_terminal() {
        let dir = TempDir::new().expect("tempdir");
        let (raw, mut events) = spawn_debounce(dir.path().join("gone.yaml"));

        raw.send(()).expect("raw send");
        assert_eq!(events.recv().await, Some(WatchEvent::Lost));
        assert_eq!(events.recv().await, None);
    }
}
