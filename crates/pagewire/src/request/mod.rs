//! Per-request execution contexts.
//!
//! Every admitted request gets exactly one context. Contexts share the
//! lifecycle and task bookkeeping in [`RequestContext`] and add the
//! behavior of their kind on top:
//!
//! - [`OperationsContext`] renders a page and streams UI operations.
//! - [`NavigationContext`] answers with the app's navigation menu.

mod context;
mod navigation;
mod operations;
mod queue;

use std::fmt;

pub use context::RequestContext;
pub use navigation::NavigationContext;
pub use operations::OperationsContext;
pub use queue::OperationQueue;

/// Which of the two request slots of a session a context occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Operations,
    Navigation,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operations => "operations",
            Self::Navigation => "navigation",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
