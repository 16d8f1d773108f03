use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

use crate::app::AppCache;
use crate::dispatcher::Dispatcher;
use crate::handlers;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    /// Cached apps, closed on shutdown after the sessions.
    pub apps: Arc<AppCache>,
    pub keep_alive_interval_seconds: u64,
    pub max_connections: usize,
}

impl AppState {
    /// Close every session, wait for in-flight work, then close the apps.
    pub async fn shutdown(&self) {
        info!("Shutting down dispatcher");
        self.dispatcher.shutdown().await;
        self.apps.clear().await;
    }
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    let max_connections = state.max_connections;

    // Operation streams run as long as the render does; no request timeout.
    let streaming_routes = Router::new()
        .route("/operations", post(handlers::v1::operations))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/navigation", post(handlers::v1::navigation))
        .route("/ping", post(handlers::v1::ping))
        .route("/sessions", get(handlers::v1::list_sessions))
        .route(
            "/sessions/{session_id}",
            get(handlers::v1::get_session).delete(handlers::v1::delete_session),
        )
        .with_state(state.clone())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ));

    let api_v1 = Router::new()
        .merge(streaming_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024)) // 2 MB
        .layer(ConcurrencyLimitLayer::new(max_connections));

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .with_state(state)
        .nest("/api/v1", api_v1)
}
