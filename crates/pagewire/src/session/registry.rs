//! Session registry: id → session state, with idle eviction.
//!
//! The registry is responsible for:
//! - Creating sessions on first sight of an id
//! - Looking up existing sessions
//! - Evicting idle sessions on a periodic sweep
//! - Closing every session on shutdown

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::{SessionMetadata, SessionState};
use crate::app::AppManager;

// ============================================================================
// Session Registry
// ============================================================================

/// Registry of live sessions. Thread-safe and cheap to clone.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<String, Arc<SessionState>>>,
    /// Notified whenever an entry leaves the map.
    removed: Arc<Notify>,
    /// Shutdown signal sender.
    shutdown_tx: Arc<watch::Sender<bool>>,
    /// Shutdown signal receiver (cloned for the sweep task).
    shutdown_rx: watch::Receiver<bool>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            sessions: Arc::new(DashMap::new()),
            removed: Arc::new(Notify::new()),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    /// Stop the eviction sweep and close every session.
    pub fn shutdown(&self) {
        info!("Shutting down session registry");

        if self.shutdown_tx.send(true).is_err() {
            debug!("No eviction sweep listening for shutdown");
        }
        let closed = self.clear();

        info!(closed, "Session registry shutdown complete");
    }

    // ------------------------------------------------------------------------
    // Core API
    // ------------------------------------------------------------------------

    /// Return the session for `session_id`, creating it if unseen.
    ///
    /// Concurrent first calls for the same id observe one state object.
    pub fn resolve(&self, session_id: &str, app_name: Option<&str>) -> Arc<SessionState> {
        if let Some(existing) = self.sessions.get(session_id) {
            return existing.value().clone();
        }

        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!(session_id = %session_id, app_name = ?app_name, "Creating session");
                Arc::new(SessionState::new(
                    session_id.to_string(),
                    app_name.map(str::to_string),
                ))
            })
            .value()
            .clone()
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionState>> {
        self.sessions.get(session_id).map(|r| r.value().clone())
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Metadata for every live session.
    pub fn list(&self) -> Vec<SessionMetadata> {
        // Collect states first so no DashMap guard is held while locking sessions.
        let states: Vec<Arc<SessionState>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut sessions: Vec<SessionMetadata> = states.iter().map(|s| s.metadata()).collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every session and empty the registry. Returns how many were closed.
    pub fn clear(&self) -> usize {
        let states: Vec<Arc<SessionState>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for state in &states {
            self.remove_entry(state);
            state.close();
        }
        states.len()
    }

    /// Wait until `state` is no longer the entry for its id.
    ///
    /// A closed session stays mapped while eviction disposes its app; callers
    /// that resolved it park here instead of spinning on `resolve`.
    pub async fn wait_removed(&self, state: &Arc<SessionState>) {
        loop {
            let notified = self.removed.notified();
            tokio::pin!(notified);
            // Register before checking so a removal in between is not lost.
            notified.as_mut().enable();

            let mapped = self
                .sessions
                .get(state.session_id())
                .is_some_and(|current| Arc::ptr_eq(current.value(), state));
            if !mapped {
                return;
            }
            notified.await;
        }
    }

    fn remove_entry(&self, state: &Arc<SessionState>) {
        let removed = self
            .sessions
            .remove_if(state.session_id(), |_, current| Arc::ptr_eq(current, state));
        if removed.is_some() {
            self.removed.notify_waiters();
        }
    }

    // ------------------------------------------------------------------------
    // Idle Eviction
    // ------------------------------------------------------------------------

    /// Evict sessions idle for at least `timeout` with no request in flight.
    ///
    /// Busy sessions are left for a later sweep. Returns the number evicted.
    pub async fn evict_idle(&self, timeout: chrono::Duration, apps: &dyn AppManager) -> usize {
        let now = Utc::now();

        // Collect states to avoid holding DashMap refs across await
        let states: Vec<Arc<SessionState>> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut evicted = 0;
        for state in states {
            if !state.close_if_idle(timeout, now) {
                continue;
            }

            let idle = now - state.last_activity_at();
            info!(
                session_id = %state.session_id(),
                idle_seconds = idle.num_seconds(),
                "Evicting idle session"
            );

            apps.dispose_session(state.session_id()).await;
            self.remove_entry(&state);
            state.close();
            evicted += 1;
        }

        if evicted > 0 {
            info!(evicted, remaining = self.len(), "Session eviction sweep complete");
        }

        evicted
    }

    /// Run [`evict_idle`](Self::evict_idle) every `interval` until shutdown.
    pub fn spawn_eviction_sweep(
        &self,
        timeout: chrono::Duration,
        interval: Duration,
        apps: Arc<dyn AppManager>,
    ) -> JoinHandle<()> {
        let registry = self.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip immediate tick

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        registry.evict_idle(timeout, apps.as_ref()).await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Eviction sweep stopping");
                            return;
                        }
                    }
                }
            }
        })
    }

    /// Remove a session by id, closing it. Returns true if one was removed.
    pub fn remove(&self, session_id: &str) -> bool {
        match self.sessions.remove(session_id) {
            Some((_, state)) => {
                self.removed.notify_waiters();
                state.close();
                true
            }
            None => {
                warn!(session_id = %session_id, "Remove requested for unknown session");
                false
            }
        }
    }
}
