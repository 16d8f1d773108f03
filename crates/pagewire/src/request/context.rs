//! State shared by every request context: lifecycle flags, attributes, and
//! the background tasks spawned while handling the request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::RequestKind;
use crate::error::RequestError;
use crate::session::SessionState;

type TaskHandle = JoinHandle<Result<(), RequestError>>;

/// Lifecycle: `Active -> Cancelled -> Closed` or `Active -> Closed`.
/// Both transitions happen at most once.
pub struct RequestContext {
    session: Arc<SessionState>,
    kind: RequestKind,
    seq: u64,
    created_at: DateTime<Utc>,
    closed_at: Mutex<Option<DateTime<Utc>>>,
    cancelled: AtomicBool,
    closed: AtomicBool,
    attributes: Mutex<HashMap<String, serde_json::Value>>,
    tasks: Mutex<Vec<TaskHandle>>,
    cancel_token: CancellationToken,
}

impl RequestContext {
    pub(crate) fn new(session: Arc<SessionState>, kind: RequestKind, seq: u64) -> Self {
        Self {
            session,
            kind,
            seq,
            created_at: Utc::now(),
            closed_at: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            attributes: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
            cancel_token: CancellationToken::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------------

    pub fn session(&self) -> &Arc<SessionState> {
        &self.session
    }

    pub fn session_id(&self) -> &str {
        self.session.session_id()
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        *lock(&self.closed_at)
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Fail if the context was cancelled. Called by every emitting operation.
    pub fn check_cancelled(&self) -> Result<(), RequestError> {
        if self.is_cancelled() {
            return Err(RequestError::Cancelled);
        }
        Ok(())
    }

    /// Fail if the context can no longer accept work.
    pub fn check_active(&self) -> Result<(), RequestError> {
        self.check_cancelled()?;
        if self.is_closed() {
            return Err(RequestError::Closed);
        }
        Ok(())
    }

    /// Token triggered when the context is cancelled or closed.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Flip to cancelled and interrupt tracked tasks.
    ///
    /// Returns `false` when already cancelled or closed; the caller then has
    /// nothing left to tear down.
    pub(crate) fn mark_cancelled(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.cancel_token.cancel();
        let tasks = std::mem::take(&mut *lock(&self.tasks));
        for task in &tasks {
            task.abort();
        }
        debug!(
            session_id = %self.session_id(),
            seq = self.seq,
            kind = %self.kind,
            aborted = tasks.len(),
            "Request context cancelled"
        );
        true
    }

    /// Close the context. Idempotent; returns `true` on the first call.
    pub(crate) fn close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        *lock(&self.closed_at) = Some(Utc::now());
        // Stragglers still racing the token stop here.
        self.cancel_token.cancel();
        lock(&self.tasks).clear();
        lock(&self.attributes).clear();
        debug!(
            session_id = %self.session_id(),
            seq = self.seq,
            kind = %self.kind,
            "Request context closed"
        );
        true
    }

    // ------------------------------------------------------------------------
    // Background Tasks
    // ------------------------------------------------------------------------

    /// Run `future` as a background task tracked by this context.
    ///
    /// The task is interrupted when the context is cancelled. Its error, if
    /// any, is reported by [`await_all_tasks`](Self::await_all_tasks).
    pub fn execute<F>(&self, future: F) -> Result<(), RequestError>
    where
        F: Future<Output = Result<(), RequestError>> + Send + 'static,
    {
        let mut tasks = lock(&self.tasks);
        self.check_active()?;

        let token = self.cancel_token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(RequestError::Cancelled),
                result = future => result,
            }
        });

        // Finished handles stay until awaited so their errors are not lost.
        tasks.push(handle);
        Ok(())
    }

    /// Wait for every task submitted so far, including tasks spawned by
    /// other tasks while waiting.
    pub async fn await_all_tasks(&self) -> Result<(), RequestError> {
        loop {
            let handles = std::mem::take(&mut *lock(&self.tasks));
            if handles.is_empty() {
                return Ok(());
            }

            for handle in handles {
                match handle.await {
                    Ok(Ok(())) => {}
                    Ok(Err(RequestError::Cancelled)) => return Err(RequestError::Cancelled),
                    Ok(Err(e)) => return Err(RequestError::Task(e.to_string())),
                    Err(e) if e.is_cancelled() => return Err(RequestError::Cancelled),
                    Err(e) => return Err(RequestError::Task(e.to_string())),
                }
            }
        }
    }

    /// Number of tracked tasks that are still running.
    pub fn pending_tasks(&self) -> usize {
        lock(&self.tasks).iter().filter(|h| !h.is_finished()).count()
    }

    // ------------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------------

    pub fn attribute(&self, name: &str) -> Option<serde_json::Value> {
        lock(&self.attributes).get(name).cloned()
    }

    pub fn set_attribute(
        &self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, RequestError> {
        let mut attributes = lock(&self.attributes);
        if self.is_closed() {
            return Err(RequestError::Closed);
        }
        Ok(attributes.insert(name.into(), value))
    }

    pub fn remove_attribute(&self, name: &str) -> Result<Option<serde_json::Value>, RequestError> {
        let mut attributes = lock(&self.attributes);
        if self.is_closed() {
            return Err(RequestError::Closed);
        }
        Ok(attributes.remove(name))
    }
}

// std::sync::Mutex is correct here: no lock in this module is held across `.await`.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
