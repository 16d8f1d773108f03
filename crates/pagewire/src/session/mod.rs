//! Session management.
//!
//! # Architecture
//!
//! ```text
//!  ┌─────────────────┐        ┌──────────────────────────┐
//!  │ SessionRegistry │──owns──▶ SessionState             │  (one per session id)
//!  │  (ID → State)   │        │  current_seq             │
//!  └─────────────────┘        │  operations slot ──────────▶ OperationsContext
//!                             │  navigation slot ──────────▶ NavigationContext
//!                             │  widgets, attributes     │
//!                             └──────────────────────────┘
//! ```
//!
//! - **SessionState**: admits requests by sequence number and holds at most
//!   one in-flight context of each kind. Installing a context cancels the
//!   one it supersedes. Waiters block until a slot empties.
//! - **SessionRegistry**: maps session ids to states; creates on first
//!   sight and evicts idle sessions on a periodic sweep.
//! - **apply_actions**: applies client interactions to registered widgets
//!   before a request's render runs.

mod actions;
mod registry;
mod state;

pub use actions::apply_actions;
pub use registry::SessionRegistry;
pub use state::{SessionMetadata, SessionState};
