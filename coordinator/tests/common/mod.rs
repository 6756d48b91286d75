//! Fake SwarmUI backend and coordinator builders for integration tests

#![allow(dead_code)]

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
use url::Url;

use coordinator::{CoordinatorConfig, WorkerCoordinator};
use supervisor::{RealBackendApi, RealProcessSupervisor};

/// Scripted behaviour of the session endpoint
#[derive(Clone, Copy, Debug, Default)]
pub struct FakeBackendConfig {
    /// Session requests answered with 503 before the backend is ready
    pub ready_after: usize,
    /// Once ready, answer every second session request with 503
    pub flaky: bool,
    /// Session requests stall for this long before answering
    pub stall: Option<Duration>,
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

/// Coordinator wired to the real HTTP client and an external backend
pub fn real_coordinator(api_url: &str, startup_timeout: Duration) -> WorkerCoordinator<RealBackendApi, RealProcessSupervisor> {
    let config = CoordinatorConfig::for_backend(Url::parse(api_url).unwrap())
        .with_startup(startup_timeout, Duration::from_millis(250))
        .with_pod("testpod", Some(7801));
    let backend = RealBackendApi::new(api_url)
        .unwrap()
        .with_probe_timeout(Duration::from_secs(2));
    WorkerCoordinator::new(config, backend, RealProcessSupervisor::external())
}

async fn new_session(State(state): State<Arc<FakeState>>) -> Response {
    let call = state.session_calls.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some(stall) = state.config.stall {
        tokio::time::sleep(stall).await;
    }
    if call <= state.config.ready_after {
        return (StatusCode::SERVICE_UNAVAILABLE, "starting").into_response();
    }
    if state.config.flaky && (call - state.config.ready_after) % 2 == 0 {
        return (StatusCode::SERVICE_UNAVAILABLE, "busy").into_response();
    }
    Json(json!({
        "session_id": format!("session-{call:04}-0123456789abcdef"),
        "version": "0.9.6-test"
    }))
    .into_response()
}

async fn echo(method: Method, uri: Uri, body: Bytes) -> Json<Value> {
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "body": body
    }))
}
