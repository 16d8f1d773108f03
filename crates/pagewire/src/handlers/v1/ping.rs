use axum::Json;
use axum::extract::State;
use pagewire_protocol::{PingRequest, PongResponse};
use tracing::debug;

use crate::server::AppState;

/// POST /api/v1/ping
///
/// Liveness probe. Echoes the session id without creating a session.
pub async fn ping(State(state): State<AppState>, Json(req): Json<PingRequest>) -> Json<PongResponse> {
    debug!(
        session_id = %req.session_id,
        known = state.dispatcher.registry().contains(&req.session_id),
        "Received ping"
    );
    Json(PongResponse {
        session_id: req.session_id,
    })
}
