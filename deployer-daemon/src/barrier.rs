//! Activity Barrier.
//!
//! Every sync or command run holds an [`ActivityToken`]. A reconfiguration
//! calls [`ActivityBarrier::drain`], which closes the gate to new tokens and
//! then waits for the outstanding ones to be dropped. The gate re-opens when
//! the returned [`DrainGuard`] is dropped.
//!
//! The state lives in a `tokio::sync::watch` channel so waiters are woken on
//! every transition and no lock is held while waiting.

use std::sync::Arc;

use tokio::sync::{watch, Mutex, OwnedMutexGuard};

/// Observable barrier state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BarrierState {
    /// Outstanding tokens.
    pub active: usize,
    pub draining: bool,
    /// Bumped each time a drain begins. Tokens are stamped with the
    /// generation they were granted in.
    pub generation: u64,
}

#[derive(Clone)]
pub struct ActivityBarrier {
    state: Arc<watch::Sender<BarrierState>>,
    drains: Arc<Mutex<()>>,
}

impl Default for ActivityBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityBarrier {
    pub fn new() -> Self {
        let (state, _) = watch::channel(BarrierState::default());
        Self {
            state: Arc::new(state),
            drains: Arc::new(Mutex::new(())),
        }
    }

    pub fn state(&self) -> BarrierState {
        *self.state.borrow()
    }

    pub fn is_draining(&self) -> bool {
        self.state.borrow().draining
    }

    /// Take a token, waiting while a drain is in progress.
    pub async fn acquire(&self) -> ActivityToken {
        loop {
            if let Some(token) = self.try_acquire() {
                return token;
            }
            let mut rx = self.state.subscribe();
            // The sender lives as long as `self`, so this cannot fail.
            let _ = rx.wait_for(|state| !state.draining).await;
        }
    }

    /// Take a token unless a drain is in progress.
    pub fn try_acquire(&self) -> Option<ActivityToken> {
        let mut generation = None;
        self.state.send_if_modified(|state| {
            if state.draining {
                return false;
            }
            state.active += 1;
            generation = Some(state.generation);
            true
        });
        generation.map(|generation| ActivityToken {
            state: self.state.clone(),
            generation,
        })
    }

    /// Close the gate to new tokens without waiting for outstanding ones.
    ///
    /// Drains are serialized: a second caller waits here until the first
    /// guard is dropped.
    pub async fn begin_drain(&self) -> DrainGuard {
        let serial = self.drains.clone().lock_owned().await;
        self.state.send_modify(|state| {
            state.draining = true;
            state.generation += 1;
        });
        tracing::debug!(active = self.state().active, "activity barrier draining");
        DrainGuard {
            state: self.state.clone(),
            _serial: serial,
        }
    }

    /// Close the gate and wait until every outstanding token is released.
    ///
    /// Dropping the returned future before it completes re-opens the gate.
    pub async fn drain(&self) -> DrainGuard {
        let guard = self.begin_drain().await;
        self.idle().await;
        guard
    }

    /// Wait until no token is outstanding. Does not close the gate.
    pub async fn idle(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| state.active == 0).await;
    }
}

/// One in-flight sync or command run. Released on drop.
#[must_use = "dropping the token releases the activity immediately"]
pub struct ActivityToken {
    state: Arc<watch::Sender<BarrierState>>,
    generation: u64,
}

impl ActivityToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Drop for ActivityToken {
    fn drop(&mut self) {
        self.state.send_modify(|state| {
            state.active = state.active.saturating_sub(1);
        });
    }
}

impl std::fmt::Debug for ActivityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityToken")
            .field("generation", &self.generation)
            .finish()
    }
}

/// Held by the drainer. Dropping it re-admits new tokens.
#[must_use = "dropping the guard ends the drain immediately"]
pub struct DrainGuard {
    state: Arc<watch::Sender<BarrierState>>,
    _serial: OwnedMutexGuard<()>,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        self.state.send_modify(|state| state.draining = false);
    }
}
