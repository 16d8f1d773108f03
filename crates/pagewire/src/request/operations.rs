use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use pagewire_protocol::{Action, Operation};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{OperationQueue, RequestContext, RequestKind};
use crate::app::App;
use crate::error::RequestError;
use crate::layout::{Container, ContainerNode};
use crate::session::{SessionState, apply_actions};

const DEFAULT_PAGE: &str = "default";

/// Context of an operations request: renders one page and streams the
/// resulting operations to the caller, always terminated by exactly one
/// `End` operation.
///
/// ```text
/// render / tasks ──push──► OperationQueue ──drain task──► outbound (caller)
/// ```
pub struct OperationsContext {
    request: RequestContext,
    page_name: String,
    queue: OperationQueue,
    /// `None` once the stream has been completed.
    outbound: Mutex<Option<mpsc::UnboundedSender<Operation>>>,
    drain: Mutex<Option<JoinHandle<()>>>,
    /// Container and stream keys handed out during this request.
    issued_keys: Mutex<HashSet<String>>,
    root: Arc<ContainerNode>,
    sidebar: Arc<ContainerNode>,
}

impl OperationsContext {
    pub(crate) fn new(
        session: Arc<SessionState>,
        seq: u64,
        page: Option<&str>,
        outbound: mpsc::UnboundedSender<Operation>,
    ) -> Self {
        let page_name = page
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PAGE)
            .to_string();

        Self {
            request: RequestContext::new(session, RequestKind::Operations, seq),
            page_name,
            queue: OperationQueue::new(),
            outbound: Mutex::new(Some(outbound)),
            drain: Mutex::new(None),
            issued_keys: Mutex::new(HashSet::new()),
            root: ContainerNode::root(),
            sidebar: ContainerNode::sidebar(),
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

    /// Requested page, `"default"` when the caller named none.
    pub fn page_name(&self) -> &str {
        &self.page_name
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

    /// The main body container of the page.
    pub fn root(self: &Arc<Self>) -> Container {
        Container::new(self.root.clone(), self.clone())
    }

    pub fn sidebar(self: &Arc<Self>) -> Container {
        Container::new(self.sidebar.clone(), self.clone())
    }

    #[cfg(test)]
    pub(crate) fn queue_for_test(&self) -> &OperationQueue {
        &self.queue
    }

    /// Draw keys from `make` until one not yet issued in this request
    /// comes up, and reserve it.
    pub(crate) fn claim_key(&self, mut make: impl FnMut() -> String) -> String {
        let mut issued = lock(&self.issued_keys);
        loop {
            let key = make();
            if issued.insert(key.clone()) {
                return key;
            }
        }
    }

    /// Queue an operation for the caller.
    pub(crate) fn enqueue(&self, op: Operation) -> Result<(), RequestError> {
        self.request.check_active()?;
        self.queue.push(op);
        Ok(())
    }

    // ========================================================================
    // Handling
    // ========================================================================

    /// Apply actions, render the page, and complete the stream.
    pub(crate) async fn handle(
        self: &Arc<Self>,
        app: Arc<dyn App>,
        actions: &[Action],
    ) -> Result<(), RequestError> {
        if self.is_cancelled() || self.is_closed() {
            return Ok(());
        }

        apply_actions(self.session(), actions)?;
        self.start_drain();

        debug!(
            session_id = %self.request.session_id(),
            seq = self.seq(),
            page = %self.page_name,
            "Rendering page"
        );
        let token = self.request.cancellation_token();
        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(RequestError::Cancelled),
            result = app.render(self.clone()) => result?,
        }

        self.request.await_all_tasks().await?;
        self.enqueue(Operation::end(false, false))?;
        self.join_drain().await;
        self.close();
        Ok(())
    }

    fn start_drain(self: &Arc<Self>) {
        let mut drain = lock(&self.drain);
        if drain.is_some() {
            return;
        }
        let ctx = self.clone();
        *drain = Some(tokio::spawn(async move { ctx.run_drain().await }));
    }

    async fn run_drain(self: Arc<Self>) {
        let token = self.request.cancellation_token();
        loop {
            // Cancellation clears the queue and sends its own `End`; an `End`
            // pushed just before that is gone, so never wait on the queue alone.
            let op = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                op = self.queue.pop() => op,
            };
            let is_end = op.is_end();

            {
                let mut outbound = lock(&self.outbound);
                let Some(tx) = outbound.as_ref() else {
                    return;
                };
                if tx.send(op).is_err() {
                    debug!(
                        session_id = %self.request.session_id(),
                        seq = self.seq(),
                        "Caller gone, dropping operation"
                    );
                }
                if is_end {
                    outbound.take();
                }
            }

            if is_end {
                // The caller has everything from this render; changes are consumed.
                if !self.session().reset_widgets_changed_after(&self) {
                    debug!(
                        session_id = %self.request.session_id(),
                        seq = self.seq(),
                        "Superseded before reset, keeping widget changes"
                    );
                }
                return;
            }
        }
    }

    async fn join_drain(&self) {
        let handle = lock(&self.drain).take();
        let Some(handle) = handle else {
            return;
        };
        match handle.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!(error = %e, "Operation drain task failed"),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Cancel the request: interrupt its tasks, drop pending operations, and
    /// complete the stream with `End { cancelled: true }`.
    ///
    /// No-op when already cancelled or closed.
    pub fn cancel(&self) {
        if self.request.mark_cancelled() {
            let dropped = self.queue.clear();
            if let Some(tx) = lock(&self.outbound).take() {
                let _ = tx.send(Operation::end(false, true));
            }
            if let Some(drain) = lock(&self.drain).take() {
                drain.abort();
            }
            debug!(
                session_id = %self.request.session_id(),
                seq = self.seq(),
                dropped,
                "Operations request cancelled"
            );
        }
        self.close();
    }

    /// Close the context. Completes the outbound stream if still open.
    pub fn close(&self) {
        if self.request.close() {
            lock(&self.outbound).take();
            if let Some(drain) = lock(&self.drain).take() {
                drain.abort();
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
