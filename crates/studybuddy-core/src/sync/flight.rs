//! Per-owner single-flight and cycle cancellation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{watch, Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one cycle token per owner at a time.
///
/// A second caller for the same owner waits for the running cycle; owners
/// never wait on each other.
#[derive(Debug, Default)]
pub struct FlightRegistry {
    owners: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one cycle.
pub struct FlightGuard {
    _guard: OwnedMutexGuard<()>,
}

impl FlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, owner_id: &str) -> FlightGuard {
        let lock = {
            let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(owners.entry(owner_id.to_string()).or_default())
        };
        FlightGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Whether a cycle currently holds the owner's token.
    pub fn is_running(&self, owner_id: &str) -> bool {
        let owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
        owners
            .get(owner_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}

/// Cancels a running cycle between per-id operations.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
