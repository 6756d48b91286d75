//! HTTP job transport
//!
//! A local rendition of the serverless job API: `/runsync` runs an action
//! inline, `/run` queues it as a background task that `/status/:id` and
//! `/cancel/:id` can inspect and abort. Dropping a `/runsync` connection
//! drops the action's future, which cancels any keep-alive loop in flight.

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use shared::{ProcessId, logging, process_info, process_warn};
use supervisor::{BackendApi, ProcessSupervisor};

use crate::coordinator_impl::WorkerCoordinator;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::jobs::{JobCounts, JobRegistry, JobStatus};
use crate::state::StateSnapshot;

/// Transport-level health, independent of the backend's readiness
#[derive(Serialize, Debug)]
pub struct TransportHealth {
    pub status: &'static str,
    pub backend_process: String,
    pub jobs: JobCounts,
    #[serde(flatten)]
    pub coordinator: StateSnapshot,
}

/// Job server wrapping a coordinator
pub struct JobServer<B, P>
where
    B: BackendApi,
    P: ProcessSupervisor,
{
    coordinator: WorkerCoordinator<B, P>,
    jobs: JobRegistry,
}

impl<B, P> Clone for JobServer<B, P>
where
    B: BackendApi,
    P: ProcessSupervisor,
{
    fn clone(&self) -> Self {
        Self {
            coordinator: self.coordinator.clone(),
            jobs: self.jobs.clone(),
        }
    }
}

impl<B, P> JobServer<B, P>
where
    B: BackendApi + 'static,
    P: ProcessSupervisor + 'static,
{
    pub fn new(coordinator: WorkerCoordinator<B, P>) -> Self {
        let jobs = JobRegistry::new(coordinator.config().job_retention);
        Self { coordinator, jobs }
    }

    pub fn coordinator(&self) -> &WorkerCoordinator<B, P> {
        &self.coordinator
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    /// Build the Axum router with all routes
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/runsync", post(runsync_handler::<B, P>))
            .route("/run", post(run_handler::<B, P>))
            .route("/status/:id", get(status_handler::<B, P>))
            .route("/cancel/:id", post(cancel_handler::<B, P>))
            .route("/health", get(health_handler::<B, P>))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).into_inner())
            .with_state(self.clone())
    }

    /// Serve jobs until `shutdown` resolves.
    ///
    /// In-flight requests then get `drain` to finish; a keep-alive still
    /// holding its connection after that is abandoned.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F, drain: Duration) -> CoordinatorResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        process_info!(ProcessId::current(), "🌐 Job transport listening on http://{}", local_addr);

        let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
        let shutdown = async move {
            shutdown.await;
            let _ = signalled_tx.send(());
        };
        let serving = axum::serve(listener, self.build_router())
            .with_graceful_shutdown(shutdown)
            .into_future();
        tokio::pin!(serving);

        tokio::select! {
            served = &mut serving => served?,
            Ok(()) = signalled_rx => match tokio::time::timeout(drain, &mut serving).await {
                Ok(served) => served?,
                Err(_) => {
                    process_warn!(
                        ProcessId::current(),
                        "⏱️ Requests still running after {}ms drain, stopping anyway",
                        drain.as_millis()
                    );
                }
            },
        }

        logging::log_success(ProcessId::current(), "Job transport stopped");
        Ok(())
    }

    /// Queue `input` as a background job
    async fn spawn_job(&self, input: Value) -> Uuid {
        let action = input.get("action").and_then(|a| a.as_str()).map(str::to_string);
        let id = self.jobs.submit(action).await;

        let worker = tokio::spawn({
            let jobs = self.jobs.clone();
            let coordinator = self.coordinator.clone();
            async move {
                jobs.start(id).await;
                let result = coordinator.handle(&input).await;
                jobs.complete(id, result.to_value()).await;
            }
        });
        self.jobs.attach(id, worker.abort_handle()).await;

        let jobs = self.jobs.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.await {
                if e.is_panic() {
                    logging::log_error(ProcessId::current(), &format!("Job {id}"), &e);
                    jobs.fail(id, format!("Job panicked: {e}")).await;
                }
            }
        });

        id
    }
}

/// Bind the transport listener
pub async fn bind_listener(addr: SocketAddr) -> CoordinatorResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| CoordinatorError::ServerStartupFailed {
            addr: addr.to_string(),
            message: e.to_string(),
        })
}

/// Extract the job `input` from a request body.
///
/// A missing body or `input` field yields `Null`, which the coordinator
/// reports as "No input provided".
pub fn job_input(body: &[u8]) -> Result<Value, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    let envelope: Value = serde_json::from_slice(body).map_err(|e| format!("Invalid JSON body: {e}"))?;
    Ok(envelope.get("input").cloned().unwrap_or(Value::Null))
}

fn not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "id": id, "error": "Job not found" })),
    )
        .into_response()
}

/// Run an action and answer with its output
async fn runsync_handler<B, P>(State(server): State<JobServer<B, P>>, body: Bytes) -> Json<Value>
where
    B: BackendApi + 'static,
    P: ProcessSupervisor + 'static,
{
    let id = Uuid::new_v4();
    let output = match job_input(&body) {
        Ok(input) => server.coordinator.handle(&input).await.to_value(),
        Err(error) => {
            process_warn!(ProcessId::current(), "⚠️ Job {} rejected: {}", id, error);
            json!({ "success": false, "error": error })
        }
    };

    Json(json!({
        "id": id,
        "status": JobStatus::Completed,
        "output": output,
    }))
}

/// Queue an action as a background job
async fn run_handler<B, P>(State(server): State<JobServer<B, P>>, body: Bytes) -> Json<Value>
where
    B: BackendApi + 'static,
    P: ProcessSupervisor + 'static,
{
    match job_input(&body) {
        Ok(input) => {
            let id = server.spawn_job(input).await;
            Json(json!({ "id": id, "status": JobStatus::InQueue }))
        }
        Err(error) => {
            let id = server.jobs.submit(None).await;
            server.jobs.complete(id, json!({ "success": false, "error": error })).await;
            Json(json!({ "id": id, "status": JobStatus::Completed }))
        }
    }
}

async fn status_handler<B, P>(State(server): State<JobServer<B, P>>, Path(id): Path<String>) -> Response
where
    B: BackendApi + 'static,
    P: ProcessSupervisor + 'static,
{
    let Ok(uuid) = Uuid::parse_str(&id) else {
        return not_found(&id);
    };
    match server.jobs.get(uuid).await {
        Some(view) => Json(view).into_response(),
        None => not_found(&id),
    }
}

async fn cancel_handler<B, P>(State(server): State<JobServer<B, P>>, Path(id): Path<String>) -> Response
where
    B: BackendApi + 'static,
    P: ProcessSupervisor + 'static,
{
    let Ok(uuid) = Uuid::parse_str(&id) else {
        return not_found(&id);
    };
    match server.jobs.cancel(uuid).await {
        Some(view) => {
            process_info!(ProcessId::current(), "🛑 Job {} is {:?}", uuid, view.status);
            Json(view).into_response()
        }
        None => not_found(&id),
    }
}

async fn health_handler<B, P>(State(server): State<JobServer<B, P>>) -> Json<TransportHealth>
where
    B: BackendApi + 'static,
    P: ProcessSupervisor + 'static,
{
    Json(TransportHealth {
        status: "ok",
        backend_process: server.coordinator.supervisor().status().await.to_string(),
        jobs: server.jobs.counts().await,
        coordinator: server.coordinator.state().snapshot(),
    })
}
