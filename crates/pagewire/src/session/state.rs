//! Per-session state: sequencing, the two request slots, widgets, and
//! session attributes.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::DispatchError;
use crate::request::{NavigationContext, OperationsContext, RequestKind};
use crate::widget::WidgetHandle;

/// Fields guarded by the session lock.
struct SessionInner {
    current_seq: u64,
    last_activity_at: DateTime<Utc>,
    /// Set once by eviction or shutdown. A closed session admits nothing.
    closed: bool,
    navigation: Option<Arc<NavigationContext>>,
    operations: Option<Arc<OperationsContext>>,
}

/// State of one client session.
///
/// Admission, installation, and slot clearing happen under one
/// `std::sync::Mutex` that is never held across `.await`. Waiters for a
/// slot to empty are woken through a `Notify`.
pub struct SessionState {
    session_id: String,
    app_name: Option<String>,
    created_at: DateTime<Utc>,
    inner: Mutex<SessionInner>,
    finished: Notify,
    widgets: DashMap<String, WidgetHandle>,
    attributes: DashMap<String, serde_json::Value>,
}

/// Point-in-time view of a session for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetadata {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub current_seq: u64,
    pub widgets: usize,
    pub operations_in_flight: bool,
    pub navigation_in_flight: bool,
}

impl SessionState {
    pub fn new(session_id: String, app_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            app_name: app_name.filter(|name| !name.trim().is_empty()),
            created_at: now,
            inner: Mutex::new(SessionInner {
                current_seq: 0,
                last_activity_at: now,
                closed: false,
                navigation: None,
                operations: None,
            }),
            finished: Notify::new(),
            widgets: DashMap::new(),
            attributes: DashMap::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.lock().last_activity_at
    }

    pub fn current_seq(&self) -> u64 {
        self.lock().current_seq
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn current_operations(&self) -> Option<Arc<OperationsContext>> {
        self.lock().operations.clone()
    }

    pub fn current_navigation(&self) -> Option<Arc<NavigationContext>> {
        self.lock().navigation.clone()
    }

    pub fn metadata(&self) -> SessionMetadata {
        let inner = self.lock();
        SessionMetadata {
            session_id: self.session_id.clone(),
            app_name: self.app_name.clone(),
            created_at: self.created_at,
            last_activity_at: inner.last_activity_at,
            current_seq: inner.current_seq,
            widgets: self.widgets.len(),
            operations_in_flight: inner.operations.is_some(),
            navigation_in_flight: inner.navigation.is_some(),
        }
    }

    // ========================================================================
    // Admission & Supersession
    // ========================================================================

    /// Admit `ctx` and install it, cancelling the operations context it
    /// supersedes. Rejected requests mutate nothing.
    pub(crate) fn admit_operations(&self, ctx: &Arc<OperationsContext>) -> Result<(), DispatchError> {
        let mut inner = self.lock();
        self.admit(&mut inner, RequestKind::Operations, ctx.seq())?;

        if let Some(previous) = inner.operations.replace(ctx.clone()) {
            debug!(
                session_id = %self.session_id,
                superseded_seq = previous.seq(),
                seq = ctx.seq(),
                "Superseding operations request"
            );
            previous.cancel();
        }
        Ok(())
    }

    /// Admit `ctx` and install it, cancelling the navigation context it
    /// supersedes. Rejected requests mutate nothing.
    pub(crate) fn admit_navigation(&self, ctx: &Arc<NavigationContext>) -> Result<(), DispatchError> {
        let mut inner = self.lock();
        self.admit(&mut inner, RequestKind::Navigation, ctx.seq())?;

        if let Some(previous) = inner.navigation.replace(ctx.clone()) {
            debug!(
                session_id = %self.session_id,
                superseded_seq = previous.seq(),
                seq = ctx.seq(),
                "Superseding navigation request"
            );
            previous.cancel();
        }
        Ok(())
    }

    /// Navigation needs a strictly newer seq; operations accept an equal one.
    fn admit(&self, inner: &mut SessionInner, kind: RequestKind, seq: u64) -> Result<(), DispatchError> {
        if inner.closed {
            return Err(DispatchError::SessionClosed(self.session_id.clone()));
        }

        let stale = match kind {
            RequestKind::Navigation => seq <= inner.current_seq,
            RequestKind::Operations => seq < inner.current_seq,
        };
        if stale {
            debug!(
                session_id = %self.session_id,
                seq,
                current = inner.current_seq,
                kind = %kind,
                "Rejecting stale request"
            );
            return Err(DispatchError::Stale {
                session_id: self.session_id.clone(),
                seq,
                current: inner.current_seq,
            });
        }

        inner.current_seq = seq;
        inner.last_activity_at = Utc::now();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------------

    /// Clear the operations slot if it still holds `ctx`, then wake waiters.
    pub(crate) fn signal_operations_finished(&self, ctx: &Arc<OperationsContext>) {
        {
            let mut inner = self.lock();
            if inner.operations.as_ref().is_some_and(|c| Arc::ptr_eq(c, ctx)) {
                inner.operations = None;
            }
        }
        self.finished.notify_waiters();
    }

    /// Clear the navigation slot if it still holds `ctx`, then wake waiters.
    pub(crate) fn signal_navigation_finished(&self, ctx: &Arc<NavigationContext>) {
        {
            let mut inner = self.lock();
            if inner.navigation.as_ref().is_some_and(|c| Arc::ptr_eq(c, ctx)) {
                inner.navigation = None;
            }
        }
        self.finished.notify_waiters();
    }

    /// Wait until no operations context is installed. A successor installed
    /// in the meantime is waited for too.
    pub async fn await_operations_finished(&self) {
        self.await_slot_empty(|inner| inner.operations.is_none()).await;
    }

    /// Wait until no navigation context is installed.
    pub async fn await_navigation_finished(&self) {
        self.await_slot_empty(|inner| inner.navigation.is_none()).await;
    }

    async fn await_slot_empty(&self, is_empty: impl Fn(&SessionInner) -> bool) {
        loop {
            // Register before checking so a signal in between is not lost.
            let notified = self.finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let empty = is_empty(&self.lock());
            if empty {
                return;
            }
            notified.await;
        }
    }

    // ========================================================================
    // Eviction & Shutdown
    // ========================================================================

    /// Mark the session closed if it has been idle for `timeout` and has no
    /// request in flight. Returns whether it was closed.
    pub(crate) fn close_if_idle(&self, timeout: Duration, now: DateTime<Utc>) -> bool {
        let mut inner = self.lock();
        if inner.closed || inner.operations.is_some() || inner.navigation.is_some() {
            return false;
        }
        if now - inner.last_activity_at < timeout {
            return false;
        }
        inner.closed = true;
        true
    }

    /// Close the session: cancel outstanding contexts, then drop widgets and
    /// attributes. Idempotent.
    pub(crate) fn close(&self) {
        let (operations, navigation) = {
            let mut inner = self.lock();
            inner.closed = true;
            (inner.operations.take(), inner.navigation.take())
        };

        if let Some(ctx) = operations {
            ctx.cancel();
        }
        if let Some(ctx) = navigation {
            ctx.cancel();
        }
        self.finished.notify_waiters();
        self.widgets.clear();
        self.attributes.clear();
    }

    // ========================================================================
    // Widgets
    // ========================================================================

    pub fn register_widget(&self, widget: WidgetHandle) {
        self.widgets.insert(widget.key().to_string(), widget);
    }

    pub fn widget(&self, key: &str) -> Option<WidgetHandle> {
        self.widgets.get(key).map(|entry| entry.value().clone())
    }

    pub fn widget_count(&self) -> usize {
        self.widgets.len()
    }

    /// Clear the `changed` flag of every registered widget.
    pub fn reset_widgets_changed(&self) {
        for entry in self.widgets.iter() {
            entry.value().lock().reset_changed();
        }
    }

    /// Clear `changed` flags after `ctx` delivered its `End`, unless a newer
    /// operations request has been installed since. Returns whether flags
    /// were cleared.
    pub(crate) fn reset_widgets_changed_after(&self, ctx: &Arc<OperationsContext>) -> bool {
        // Held across the reset so a successor cannot apply actions in between.
        let inner = self.lock();
        if !inner.operations.as_ref().is_some_and(|c| Arc::ptr_eq(c, ctx)) {
            return false;
        }
        self.reset_widgets_changed();
        true
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    pub fn attribute(&self, name: &str) -> Option<serde_json::Value> {
        self.attributes.get(name).map(|entry| entry.value().clone())
    }

    pub fn set_attribute(
        &self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.attributes.insert(name.into(), value)
    }

    pub fn remove_attribute(&self, name: &str) -> Option<serde_json::Value> {
        self.attributes.remove(name).map(|(_, value)| value)
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("session_id", &self.session_id)
            .field("app_name", &self.app_name)
            .field("current_seq", &self.current_seq())
            .finish_non_exhaustive()
    }
}
