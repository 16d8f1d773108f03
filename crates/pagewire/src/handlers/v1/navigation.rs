use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use pagewire_protocol::NavigationRequest;

use crate::handlers::problem_details;
use crate::server::AppState;

/// POST /api/v1/navigation
///
/// Answers with the app's navigation menu. A request superseded by a newer
/// one answers `{"cancelled": true}`; a stale one is rejected with 409.
pub async fn navigation(
    State(state): State<AppState>,
    Json(req): Json<NavigationRequest>,
) -> Response {
    if req.session_id.trim().is_empty() {
        return problem_details::bad_request("session_id must not be blank").into_response();
    }

    match state.dispatcher.submit_navigation(req).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => problem_details::from_dispatch_error(&e).into_response(),
    }
}
