//! Action dispatch for the SwarmUI worker
//!
//! Every action returns an [`ActionResult`]; failures are folded into the
//! result instead of surfacing as errors, so the transport always has a
//! well-formed JSON body to hand back.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use shared::logging::{self, redact_session};
use shared::{
    ActionRequest, ActionResult, ForwardRequest, HealthStatus, KeepAliveReport, ProcessId, ReadyStatus,
    WakeupReport, process_debug, process_info, process_warn,
};
use supervisor::{BackendApi, ProcessSupervisor};

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::keepalive::{run_keepalive, wait_for_ready};
use crate::state::CoordinatorState;

const SHUTDOWN_MESSAGE: &str = "Shutdown acknowledged; the worker is released once the current keep-alive expires";

/// Lifecycle coordinator with injected backend and process seams
pub struct WorkerCoordinator<B, P>
where
    B: BackendApi,
    P: ProcessSupervisor,
{
    config: Arc<CoordinatorConfig>,
    backend: Arc<B>,
    supervisor: Arc<P>,
    state: Arc<CoordinatorState>,
}

impl<B, P> Clone for WorkerCoordinator<B, P>
where
    B: BackendApi,
    P: ProcessSupervisor,
{
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            backend: self.backend.clone(),
            supervisor: self.supervisor.clone(),
            state: self.state.clone(),
        }
    }
}

impl<B, P> WorkerCoordinator<B, P>
where
    B: BackendApi + 'static,
    P: ProcessSupervisor + 'static,
{
    /// Create a coordinator with injected dependencies
    pub fn new(config: CoordinatorConfig, backend: B, supervisor: P) -> Self {
        Self {
            config: Arc::new(config),
            backend: Arc::new(backend),
            supervisor: Arc::new(supervisor),
            state: Arc::new(CoordinatorState::new()),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn supervisor(&self) -> &Arc<P> {
        &self.supervisor
    }

    pub fn state(&self) -> &Arc<CoordinatorState> {
        &self.state
    }

    /// Parse a raw job input and run it
    pub async fn handle(&self, input: &Value) -> ActionResult {
        match ActionRequest::from_input(input) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => {
                process_warn!(ProcessId::current(), "⚠️ Rejected job input: {}", e);
                e.into()
            }
        }
    }

    pub async fn dispatch(&self, request: ActionRequest) -> ActionResult {
        let count = self.state.record_action();
        process_debug!(ProcessId::current(), "📥 Action #{}: {}", count, request.name());

        match request {
            ActionRequest::Health => self.health().await,
            ActionRequest::Ready => self.ready().await,
            ActionRequest::Wakeup {
                duration_secs,
                interval_secs,
            } => {
                self.wakeup(Duration::from_secs(duration_secs), Duration::from_secs(interval_secs))
                    .await
            }
            ActionRequest::KeepAlive {
                duration_secs,
                interval_secs,
            } => {
                self.keepalive(Duration::from_secs(duration_secs), Duration::from_secs(interval_secs))
                    .await
            }
            ActionRequest::Shutdown => self.shutdown(),
            ActionRequest::SwarmApi(request) => self.swarm_api(request).await,
        }
    }

    /// One bounded probe; never waits for readiness
    pub async fn health(&self) -> ActionResult {
        let healthy = time::timeout(self.config.health_timeout, self.backend.probe_ready())
            .await
            .unwrap_or(false);
        ActionResult::Health(HealthStatus { healthy })
    }

    /// Probe once and, if the backend answers, hand out a fresh session
    pub async fn ready(&self) -> ActionResult {
        if !self.backend.probe_ready().await {
            let state = self.supervisor.status().await.worker_state(false);
            return ActionResult::Ready(ReadyStatus::not_ready().with_state(state));
        }

        match self.backend.new_session().await {
            Ok(session) => {
                process_info!(
                    ProcessId::current(),
                    "✅ SwarmUI ready (session {}, version {})",
                    redact_session(&session.session_id),
                    session.version
                );
                ActionResult::Ready(ReadyStatus::ready(
                    session.session_id,
                    session.version,
                    self.config.endpoint(),
                ))
            }
            Err(e) => {
                let err = CoordinatorError::SessionFailed(e);
                process_warn!(ProcessId::current(), "⚠️ Probe passed but {}", err);
                ActionResult::Ready(ReadyStatus::broken(err.to_string()))
            }
        }
    }

    /// Bring the backend up, then hold it for `duration`
    pub async fn wakeup(&self, duration: Duration, interval: Duration) -> ActionResult {
        match self.wake(duration, interval).await {
            Ok(report) => ActionResult::Wakeup(report),
            Err(e) => {
                logging::log_error(ProcessId::current(), "Wakeup", &e);
                ActionResult::failure(e.to_string())
            }
        }
    }

    async fn wake(&self, duration: Duration, interval: Duration) -> CoordinatorResult<WakeupReport> {
        logging::log_progress(
            ProcessId::current(),
            "Wakeup",
            &format!("hold {}s, ping every {}s", duration.as_secs(), interval.as_secs()),
        );

        if let Some(pid) = self.supervisor.launch().await? {
            process_debug!(ProcessId::current(), "🔧 Backend process running (PID: {})", pid);
        }

        let backoff = self.config.startup_backoff_for(interval);
        let wait = wait_for_ready(
            self.backend.as_ref(),
            self.supervisor.as_ref(),
            self.config.startup_timeout,
            backoff,
        )
        .await?;

        let session = self
            .backend
            .new_session()
            .await
            .map_err(CoordinatorError::SessionFailed)?;

        process_info!(
            ProcessId::current(),
            "✅ SwarmUI ready after {}s ({} start, session {}, version {})",
            wait.waited.as_secs(),
            if wait.is_warm() { "warm" } else { "cold" },
            redact_session(&session.session_id),
            session.version
        );

        let keepalive = {
            let _guard = self.state.begin_keepalive();
            run_keepalive(self.backend.as_ref(), duration, interval).await
        };

        Ok(WakeupReport {
            success: true,
            session_id: session.session_id,
            version: session.version,
            endpoint: self.config.endpoint(),
            warm_start: wait.is_warm(),
            keepalive,
        })
    }

    /// Hold the worker without checking readiness first
    pub async fn keepalive(&self, duration: Duration, interval: Duration) -> ActionResult {
        let summary = {
            let _guard = self.state.begin_keepalive();
            run_keepalive(self.backend.as_ref(), duration, interval).await
        };

        ActionResult::KeepAlive(KeepAliveReport {
            success: true,
            pings: summary.pings,
            failures: summary.failures,
            duration: summary.duration,
            interval: interval.as_secs(),
        })
    }

    /// Record the intent to release the worker; nothing is stopped
    pub fn shutdown(&self) -> ActionResult {
        if self.state.request_shutdown() {
            logging::log_shutdown(
                ProcessId::current(),
                &format!(
                    "release requested ({} keep-alive loop(s) still running)",
                    self.state.active_keepalives()
                ),
            );
        } else {
            process_debug!(ProcessId::current(), "🛑 Shutdown already requested");
        }
        ActionResult::shutdown_ack(SHUTDOWN_MESSAGE)
    }

    /// Forward a call to the backend and return its body untouched
    pub async fn swarm_api(&self, request: ForwardRequest) -> ActionResult {
        let timeout = request
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.config.generation_timeout);

        match self.backend.forward(&request, timeout).await {
            Ok(body) => ActionResult::forwarded(body),
            Err(e) => {
                process_warn!(
                    ProcessId::current(),
                    "⚠️ {} {} failed: {}",
                    request.method,
                    request.path,
                    e
                );
                ActionResult::failure(e.to_string())
            }
        }
    }
}
