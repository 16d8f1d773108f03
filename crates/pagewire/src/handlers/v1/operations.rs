use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use pagewire_protocol::{Operation, OperationsRequest};
use tracing::error;

use crate::handlers::problem_details;
use crate::server::AppState;

/// POST /api/v1/operations
///
/// Renders the requested page and streams the resulting operations.
/// Events emitted:
/// - `operation`: one JSON-encoded operation per event, the last being `end`
///
/// A stale sequence number is rejected with 409 before any event is sent.
pub async fn operations(
    State(state): State<AppState>,
    Json(req): Json<OperationsRequest>,
) -> Response {
    if req.session_id.trim().is_empty() {
        return problem_details::bad_request("session_id must not be blank").into_response();
    }

    let stream = match state.dispatcher.submit_operations(req).await {
        Ok(stream) => stream,
        Err(e) => return problem_details::from_dispatch_error(&e).into_response(),
    };

    let session_id = stream.session_id().to_string();
    let events = stream.map(move |op| Ok::<_, Infallible>(operation_event(&session_id, &op)));

    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.keep_alive_interval_seconds))
        .text("keep-alive");

    Sse::new(events).keep_alive(keep_alive).into_response()
}

fn operation_event(session_id: &str, op: &Operation) -> Event {
    match Event::default().event("operation").json_data(op) {
        Ok(event) => event,
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Failed to encode operation");
            Event::default().event("error").data(e.to_string())
        }
    }
}
