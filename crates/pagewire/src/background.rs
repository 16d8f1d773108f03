//! Registry of request work tasks.
//!
//! Every request the dispatcher admits runs its render or menu work on a
//! spawned task registered here, so shutdown can wait for in-flight work
//! to wind down after the registry has cancelled it.

// std::sync::Mutex is correct here: the lock is never held across .await points.
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{info, warn};

// ============================================================================
// BackgroundTasks
// ============================================================================

/// Registry for tasks that should be awaited on shutdown.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task and register its handle.
    ///
    /// Registration happens before this returns, so a task that finishes
    /// immediately is still observed by `shutdown()`.
    pub fn spawn<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);

        let mut guard = self.lock();
        guard.retain(|h| !h.is_finished());
        guard.push(handle);
    }

    /// Wait for every registered task to complete.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.lock());

        let count = handles.len();
        if count == 0 {
            return;
        }

        info!(count, "Waiting for request tasks to complete");

        for (i, handle) in handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                warn!(task = i, error = %e, "Request task panicked");
            }
        }

        info!("All request tasks completed");
    }

    /// Number of tasks still running.
    pub fn pending_count(&self) -> usize {
        let mut guard = self.lock();
        guard.retain(|h| !h.is_finished());
        guard.len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ============================================================================
// Tests
// ============================================================================
