//! Integration tests for the HTTP API.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use pagewire::protocol::Operation;
use pagewire::server;
use tower::ServiceExt;

mod common;

use common::{ScriptedApp, hello_app, test_app, test_app_state};

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

/// Parse the `data:` lines of an SSE body into operations.
fn parse_sse_operations(body: &str) -> Vec<Operation> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

// ============================================================================
// Health Endpoints
// ============================================================================

#[tokio::test]
async fn test_livez() {
    let response = test_app()
        .oneshot(Request::get("/livez").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn test_readyz() {
    let response = test_app()
        .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["sessions"], 0);
}

#[tokio::test]
async fn test_version() {
    let response = test_app()
        .oneshot(Request::get("/version").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert!(json.get("version").is_some());
    assert!(json.get("commit").is_some());
}

// ============================================================================
// Operations
// ============================================================================

#[tokio::test]
async fn test_operations_streams_sse() {
    let response = test_app()
        .oneshot(post_json(
            "/api/v1/operations",
            serde_json::json!({"session_id": "s1", "seq": 1}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let body = String::from_utf8(body.to_vec()).unwrap();
    assert!(body.contains("event: operation"));

    let ops = parse_sse_operations(&body);
    assert_eq!(ops.len(), 3);
    assert!(matches!(&ops[0], Operation::Title { body, .. } if body == "Hello"));
    assert!(matches!(&ops[1], Operation::Text { body, .. } if body == "World"));
    assert_eq!(ops[2], Operation::end(false, false));
}

#[tokio::test]
async fn test_stale_operations_is_conflict() {
    let app: Router = server::build_app(test_app_state(hello_app()), 300);

    let first = app
        .clone()
        .oneshot(post_json(
            "/api/v1/operations",
            serde_json::json!({"session_id": "s1", "seq": 4}),
        ))
        .await
        .unwrap();
    // Drain the stream so the request completes.
    first.into_body().collect().await.unwrap();

    let response = app
        .oneshot(post_json(
            "/api/v1/operations",
            serde_json::json!({"session_id": "s1", "seq": 3}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/problem+json"
    );
    let json = body_json(response).await;
    assert_eq!(json["status"], 409);
    assert!(json.get("type").is_some());
    assert!(json["detail"].as_str().unwrap().contains("seq 3"));
}

#[tokio::test]
async fn test_dispatcher_shutdown_ends_open_stream() {
    let state = test_app_state(ScriptedApp::new(|ctx| async move {
        ctx.root().text("working")?;
        std::future::pending::<()>().await;
        Ok(())
    }));
    let app = server::build_app(state.clone(), 300);

    let response = app
        .oneshot(post_json(
            "/api/v1/operations",
            serde_json::json!({"session_id": "s1", "seq": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = tokio::spawn(async move { response.into_body().collect().await });

    state.dispatcher.shutdown().await;

    let body = tokio::time::timeout(std::time::Duration::from_secs(5), body)
        .await
        .expect("stream should end once sessions are closed")
        .unwrap()
        .unwrap()
        .to_bytes();
    let ops = parse_sse_operations(&String::from_utf8(body.to_vec()).unwrap());
    assert_eq!(ops.last(), Some(&Operation::end(false, true)));
}

#[tokio::test]
async fn test_blank_session_id_is_bad_request() {
    let response = test_app()
        .oneshot(post_json(
            "/api/v1/operations",
            serde_json::json!({"session_id": "  ", "seq": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Navigation
// ============================================================================

#[tokio::test]
async fn test_navigation_without_menu() {
    let response = test_app()
        .oneshot(post_json(
            "/api/v1/navigation",
            serde_json::json!({"session_id": "s1", "seq": 1}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["cancelled"], false);
    assert!(json.get("navigation").is_none());
}

#[tokio::test]
async fn test_duplicate_navigation_is_conflict() {
    let app = test_app();
    let request = || {
        post_json(
            "/api/v1/navigation",
            serde_json::json!({"session_id": "s1", "seq": 2}),
        )
    };

    let first = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

// ============================================================================
// Ping & Sessions
// ============================================================================

#[tokio::test]
async fn test_ping_echoes_without_creating_session() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/ping",
            serde_json::json!({"session_id": "nobody"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["session_id"], "nobody");

    let response = app
        .oneshot(Request::get("/api/v1/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(response).await["sessions"], serde_json::json!([]));
}

#[tokio::test]
async fn test_session_lifecycle() {
    let app = test_app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/navigation",
            serde_json::json!({"session_id": "s1", "app_name": "demo", "seq": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(Request::get("/api/v1/sessions/s1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["session_id"], "s1");
    assert_eq!(json["app_name"], "demo");
    assert_eq!(json["current_seq"], 1);

    let response = app
        .clone()
        .oneshot(
            Request::delete("/api/v1/sessions/s1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(Request::get("/api/v1/sessions/s1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["status"], 404);
}
