//! Request dispatch: resolve the session, admit, install, spawn the work,
//! and hand the result back to the transport layer.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use pagewire_protocol::{
    Action, NavigationRequest, NavigationResponse, Operation, OperationsRequest,
};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::app::AppManager;
use crate::background::BackgroundTasks;
use crate::error::{DispatchError, RequestError};
use crate::request::{NavigationContext, OperationsContext, RequestContext, RequestKind};
use crate::session::{SessionRegistry, SessionState};

const FAILURE_CHANNEL_CAPACITY: usize = 64;

/// A request whose work failed for a reason other than cancellation.
#[derive(Debug, Clone)]
pub struct RequestFailure {
    pub session_id: String,
    pub kind: RequestKind,
    pub seq: u64,
    pub message: String,
    pub at: DateTime<Utc>,
}

// ============================================================================
// Operation Stream
// ============================================================================

/// Operations produced by one operations request, ending with exactly one
/// `End`. The stream finishes after the `End` has been yielded.
pub struct OperationStream {
    session: Arc<SessionState>,
    seq: u64,
    rx: mpsc::UnboundedReceiver<Operation>,
}

impl OperationStream {
    pub fn session_id(&self) -> &str {
        self.session.session_id()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Wait until the session has no operations request in flight.
    pub async fn finished(&self) {
        self.session.await_operations_finished().await;
    }
}

impl Stream for OperationStream {
    type Item = Operation;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Operation>> {
        self.rx.poll_recv(cx)
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Entry point for both request kinds. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    registry: SessionRegistry,
    apps: Arc<dyn AppManager>,
    tasks: BackgroundTasks,
    failures: broadcast::Sender<RequestFailure>,
}

impl Dispatcher {
    pub fn new(registry: SessionRegistry, apps: Arc<dyn AppManager>) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            registry,
            apps,
            tasks: BackgroundTasks::new(),
            failures,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Work tasks still running.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.pending_count()
    }

    /// Receive every non-cancellation work failure from now on.
    pub fn subscribe_failures(&self) -> broadcast::Receiver<RequestFailure> {
        self.failures.subscribe()
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Admit an operations request and start rendering.
    ///
    /// Admission happens before this returns: a stale request fails here
    /// and mutates nothing.
    pub async fn submit_operations(
        &self,
        request: OperationsRequest,
    ) -> Result<OperationStream, DispatchError> {
        let OperationsRequest {
            session_id,
            app_name,
            seq,
            page,
            actions,
        } = request;

        let (ctx, rx) = self
            .install(&session_id, app_name.as_deref(), |session| {
                let (tx, rx) = mpsc::unbounded_channel();
                let ctx = Arc::new(OperationsContext::new(
                    session.clone(),
                    seq,
                    page.as_deref(),
                    tx,
                ));
                session.admit_operations(&ctx)?;
                Ok((ctx, rx))
            })
            .await?;

        debug!(
            session_id = %session_id,
            seq,
            page = %ctx.page_name(),
            actions = actions.len(),
            "Operations request admitted"
        );

        let stream = OperationStream {
            session: ctx.session().clone(),
            seq,
            rx,
        };

        let dispatcher = self.clone();
        self.tasks
            .spawn(async move { dispatcher.operations_work(ctx, actions).await });

        Ok(stream)
    }

    /// Submit, collect every operation, then wait for the session's
    /// operations slot to empty.
    pub async fn run_operations(
        &self,
        request: OperationsRequest,
    ) -> Result<Vec<Operation>, DispatchError> {
        use futures::StreamExt;

        let mut stream = self.submit_operations(request).await?;
        let mut operations = Vec::new();
        while let Some(op) = stream.next().await {
            operations.push(op);
        }
        stream.finished().await;
        Ok(operations)
    }

    async fn operations_work(&self, ctx: Arc<OperationsContext>, actions: Vec<Action>) {
        let result = async {
            let app = self.apps.get_or_create_app(ctx.session()).await?;
            ctx.handle(app, &actions).await
        }
        .await;

        if let Err(e) = result {
            self.report_failure(ctx.request(), &e);
            ctx.cancel();
        }
        ctx.session().signal_operations_finished(&ctx);
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    /// Admit a navigation request and wait for its response.
    ///
    /// A request superseded while in flight answers with a cancelled
    /// response. A work failure other than cancellation is returned as an
    /// error.
    pub async fn submit_navigation(
        &self,
        request: NavigationRequest,
    ) -> Result<NavigationResponse, DispatchError> {
        let NavigationRequest {
            session_id,
            app_name,
            seq,
            actions,
        } = request;

        let (ctx, response_rx) = self
            .install(&session_id, app_name.as_deref(), |session| {
                let (tx, rx) = oneshot::channel();
                let ctx = Arc::new(NavigationContext::new(session.clone(), seq, tx));
                session.admit_navigation(&ctx)?;
                Ok((ctx, rx))
            })
            .await?;

        debug!(session_id = %session_id, seq, "Navigation request admitted");

        let session = ctx.session().clone();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let dispatcher = self.clone();
        self.tasks.spawn(async move {
            let outcome = dispatcher.navigation_work(ctx, actions).await;
            let _ = outcome_tx.send(outcome);
        });

        let response = response_rx
            .await
            .unwrap_or_else(|_| NavigationResponse::cancelled());
        let outcome = outcome_rx.await.unwrap_or(Ok(()));
        session.await_navigation_finished().await;

        match outcome {
            Err(e) if !e.is_cancelled() => Err(e.into()),
            _ => Ok(response),
        }
    }

    async fn navigation_work(
        &self,
        ctx: Arc<NavigationContext>,
        actions: Vec<Action>,
    ) -> Result<(), RequestError> {
        let result = async {
            let app = self.apps.get_or_create_app(ctx.session()).await?;
            ctx.handle(app, &actions).await
        }
        .await;

        if let Err(e) = &result {
            self.report_failure(ctx.request(), e);
            ctx.cancel();
        }
        ctx.session().signal_navigation_finished(&ctx);
        result
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Run the registry's idle eviction sweep with this dispatcher's apps.
    pub fn spawn_eviction_sweep(
        &self,
        timeout: chrono::Duration,
        interval: std::time::Duration,
    ) -> JoinHandle<()> {
        self.registry
            .spawn_eviction_sweep(timeout, interval, self.apps.clone())
    }

    /// Close one session and dispose its app. Returns false for an unknown id.
    pub async fn close_session(&self, session_id: &str) -> bool {
        if !self.registry.remove(session_id) {
            return false;
        }
        self.apps.dispose_session(session_id).await;
        true
    }

    /// Close every session, then wait for in-flight work to wind down.
    pub async fn shutdown(&self) {
        self.registry.shutdown();
        self.tasks.shutdown().await;
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Resolve the session and run `install` against it, retrying on a
    /// fresh session if eviction closed the resolved one in between.
    async fn install<T>(
        &self,
        session_id: &str,
        app_name: Option<&str>,
        mut install: impl FnMut(&Arc<SessionState>) -> Result<T, DispatchError>,
    ) -> Result<T, DispatchError> {
        loop {
            let session = self.registry.resolve(session_id, app_name);
            match install(&session) {
                Err(DispatchError::SessionClosed(_)) => {
                    debug!(session_id = %session_id, "Resolved a closed session, retrying");
                    // Eviction removes it once the app is disposed.
                    self.registry.wait_removed(&session).await;
                }
                other => return other,
            }
        }
    }

    fn report_failure(&self, request: &RequestContext, err: &RequestError) {
        if err.is_cancelled() || request.is_cancelled() {
            debug!(
                session_id = %request.session_id(),
                seq = request.seq(),
                kind = %request.kind(),
                "Request cancelled"
            );
            return;
        }

        error!(
            session_id = %request.session_id(),
            seq = request.seq(),
            kind = %request.kind(),
            error = %err,
            "Request failed"
        );
        // No subscribers is fine.
        let _ = self.failures.send(RequestFailure {
            session_id: request.session_id().to_string(),
            kind: request.kind(),
            seq: request.seq(),
            message: err.to_string(),
            at: Utc::now(),
        });
    }
}
