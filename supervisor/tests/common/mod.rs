//! Fake SwarmUI backend for supervisor integration tests

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Scripted readiness behaviour of the fake backend
#[derive(Clone, Copy, Debug, Default)]
pub struct FakeBackendConfig {
    /// Number of session requests answered with 503 before becoming ready
    pub ready_after: usize,
    /// Answer session requests with a body that is not JSON
    pub malformed_sessions: bool,
}

struct FakeState {
    config: FakeBackendConfig,
    session_calls: AtomicUsize,
}

/// Running fake backend bound to an ephemeral loopback port
pub struct FakeBackend {
    pub addr: SocketAddr,
    state: Arc<FakeState>,
}

impl FakeBackend {
    pub async fn start(config: FakeBackendConfig) -> Self {
        let state = Arc::new(FakeState {
            config,
            session_calls: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/API/GetNewSession", post(new_session))
            .route("/API/Fail", post(fail))
            .route("/API/Slow", post(slow))
            .route("/API/NotJson", post(not_json))
            .route("/API/Empty", post(empty))
            .fallback(echo)
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn session_calls(&self) -> usize {
        self.state.session_calls.load(Ordering::SeqCst)
    }
}

/// A loopback URL nothing is listening on
pub async fn unreachable_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn new_session(State(state): State<Arc<FakeState>>) -> Response {
    let call = state.session_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if call <= state.config.ready_after {
        return (StatusCode::SERVICE_UNAVAILABLE, "starting").into_response();
    }
    if state.config.malformed_sessions {
        return (StatusCode::OK, "<html>loading</html>").into_response();
    }
    Json(json!({
        "session_id": format!("session-{call:04}-0123456789abcdef"),
        "version": "0.9.6-test"
    }))
    .into_response()
}

async fn fail() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "boom"}))).into_response()
}

async fn slow() -> Response {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Json(json!({"late": true})).into_response()
}

async fn not_json() -> Response {
    (StatusCode::OK, "plain text").into_response()
}

async fn empty() -> Response {
    StatusCode::OK.into_response()
}

async fn echo(method: Method, uri: Uri, body: Bytes) -> Json<Value> {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "body": body
    }))
}
