//! Settings Store: a single-writer slot holding the current immutable snapshot.

use std::sync::Arc;

use tokio::sync::RwLock;

/// Readers get an `Arc` to the snapshot current at the time of the call and
/// keep using it even if a newer one is published meanwhile.
pub struct SettingsStore<T> {
    current: Arc<RwLock<Arc<T>>>,
}

impl<T> Clone for SettingsStore<T> {
    fn clone(&self) -> Self {
        Self {
            current: self.current.clone(),
        }
    }
}

impl<T> SettingsStore<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    pub async fn load(&self) -> Arc<T> {
        self.current.read().await.clone()
    }

    /// Replace the snapshot wholesale and hand back the previous one.
    pub async fn publish(&self, next: T) -> Arc<T> {
        let next = Arc::new(next);
        let mut slot = self.current.write().await;
        std::mem::replace(&mut *slot, next)
    }
}
