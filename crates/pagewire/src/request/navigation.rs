use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use pagewire_protocol::{Action, NavigationResponse};
use tokio::sync::oneshot;
use tracing::debug;

use super::{RequestContext, RequestKind};
use crate::app::App;
use crate::error::RequestError;
use crate::session::{SessionState, apply_actions};

/// Context of a navigation request: asks the app for its menu and answers
/// with a single response.
pub struct NavigationContext {
    request: RequestContext,
    /// `None` once a response has been delivered.
    response: Mutex<Option<oneshot::Sender<NavigationResponse>>>,
}

impl NavigationContext {
    pub(crate) fn new(
        session: Arc<SessionState>,
        seq: u64,
        response: oneshot::Sender<NavigationResponse>,
    ) -> Self {
        Self {
            request: RequestContext::new(session, RequestKind::Navigation, seq),
            response: Mutex::new(Some(response)),
        }
    }

    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    pub fn session(&self) -> &Arc<SessionState> {
        self.request.session()
    }

    pub fn seq(&self) -> u64 {
        self.request.seq()
    }

    pub fn is_cancelled(&self) -> bool {
        self.request.is_cancelled()
    }

    pub fn is_closed(&self) -> bool {
        self.request.is_closed()
    }

    pub fn check_cancelled(&self) -> Result<(), RequestError> {
        self.request.check_cancelled()
    }

    /// See [`RequestContext::execute`].
    pub fn execute<F>(&self, future: F) -> Result<(), RequestError>
    where
        F: Future<Output = Result<(), RequestError>> + Send + 'static,
    {
        self.request.execute(future)
    }

    /// Apply actions, fetch the app's menu, and deliver the response.
    pub(crate) async fn handle(
        self: &Arc<Self>,
        app: Arc<dyn App>,
        actions: &[Action],
    ) -> Result<(), RequestError> {
        if self.is_cancelled() || self.is_closed() {
            return Ok(());
        }

        apply_actions(self.session(), actions)?;

        let token = self.request.cancellation_token();
        let menu = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(RequestError::Cancelled),
            menu = app.navigation_menu(self) => menu?,
        };
        let response = NavigationResponse {
            navigation: menu.map(|m| m.to_navigation()),
            cancelled: false,
        };

        self.request.await_all_tasks().await?;
        self.deliver(response);
        self.close();
        Ok(())
    }

    fn deliver(&self, response: NavigationResponse) {
        let Some(tx) = lock(&self.response).take() else {
            return;
        };
        if tx.send(response).is_err() {
            debug!(
                session_id = %self.request.session_id(),
                seq = self.seq(),
                "Caller gone, dropping navigation response"
            );
        }
    }

    /// Cancel the request and answer with a cancelled response.
    ///
    /// No-op when already cancelled or closed.
    pub fn cancel(&self) {
        if self.request.mark_cancelled() {
            self.deliver(NavigationResponse::cancelled());
        }
        self.close();
    }

    pub fn close(&self) {
        if self.request.close() {
            lock(&self.response).take();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
