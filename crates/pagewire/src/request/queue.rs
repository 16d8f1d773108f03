//! Unbounded FIFO of operations with an awaiting pop.
//!
//! Producers are render logic and any background tasks it spawned; the
//! single consumer is the drain task of the owning operations context.

use std::collections::VecDeque;
use std::sync::Mutex;

use pagewire_protocol::Operation;
use tokio::sync::Notify;

#[derive(Default)]
pub struct OperationQueue {
    pending: Mutex<VecDeque<Operation>>,
    /// Notified on every push.
    available: Notify,
}

impl OperationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, op: Operation) {
        self.lock().push_back(op);
        self.available.notify_one();
    }

    /// Pop the oldest operation, waiting while the queue is empty.
    pub async fn pop(&self) -> Operation {
        loop {
            if let Some(op) = self.lock().pop_front() {
                return op;
            }
            // notify_one stores a permit when nobody is waiting, so a push
            // between the check above and this await is not lost.
            self.available.notified().await;
        }
    }

    pub fn try_pop(&self) -> Option<Operation> {
        self.lock().pop_front()
    }

    /// Drop everything still pending, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut pending = self.lock();
        let dropped = pending.len();
        pending.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Operation>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
