//! Session administration handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::handlers::problem_details;
use crate::server::AppState;
use crate::session::SessionMetadata;

#[derive(Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<SessionMetadata>,
}

/// GET /api/v1/sessions
pub async fn list_sessions(State(state): State<AppState>) -> Json<ListSessionsResponse> {
    Json(ListSessionsResponse {
        sessions: state.dispatcher.registry().list(),
    })
}

/// GET /api/v1/sessions/{session_id}
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match state.dispatcher.registry().get(&session_id) {
        Some(session) => Json(session.metadata()).into_response(),
        None => problem_details::not_found("session not found").into_response(),
    }
}

/// DELETE /api/v1/sessions/{session_id}
///
/// Closes the session, cancelling anything in flight, and disposes its app.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    if state.dispatcher.close_session(&session_id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        problem_details::not_found("session not found").into_response()
    }
}
