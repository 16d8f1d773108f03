//! Error types shared by the session, request, and dispatch layers.

use thiserror::Error;

use crate::menu::MenuError;

/// Failures scoped to a single request context.
///
/// Anything in here is fatal to the request that raised it and to nothing
/// else: the context is cancelled and closed, the session survives.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The context was cancelled, usually because a newer request superseded it.
    #[error("request context cancelled")]
    Cancelled,

    #[error("request context closed")]
    Closed,

    /// Invalid container nesting or layout parameters.
    #[error("invalid layout: {0}")]
    Structure(String),

    #[error("invalid widget: {0}")]
    Widget(String),

    /// An action whose payload does not fit the addressed widget.
    #[error("invalid action for widget '{key}': {reason}")]
    Action { key: String, reason: String },

    #[error("invalid navigation menu: {0}")]
    Menu(#[from] MenuError),

    /// A background task spawned through `execute` failed.
    #[error("background task failed: {0}")]
    Task(String),

    /// Application-defined failure raised from render or menu callbacks.
    #[error("app error: {0}")]
    App(String),
}

impl RequestError {
    /// Convenience constructor for application code.
    pub fn app(message: impl Into<String>) -> Self {
        Self::App(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Failures surfaced at the dispatcher boundary.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Sequence number violates the admission rule. Nothing was mutated.
    #[error("stale request for session '{session_id}': seq {seq} not admitted at current seq {current}")]
    Stale {
        session_id: String,
        seq: u64,
        current: u64,
    },

    /// The session was evicted between lookup and admission.
    #[error("session '{0}' is closed")]
    SessionClosed(String),

    #[error(transparent)]
    Request(#[from] RequestError),
}
