//! Trait definitions with mockall annotations for testing
//!
//! The coordinator depends on these seams rather than on the reqwest and
//! tokio::process implementations, so its timing loops can be driven by
//! mocks under a paused clock.

use serde_json::Value;
use std::fmt;
use std::time::Duration;

use shared::{ForwardRequest, WorkerState};

use crate::error::SupervisorResult;

/// A fresh session issued by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSession {
    pub session_id: String,
    pub version: String,
}

/// Lifecycle of the supervised child process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// No launch configured; the backend is started by someone else
    External,
    /// Launch configured but not performed yet
    NotStarted,
    Running { pid: u32 },
    Exited { code: Option<i32> },
}

impl ProcessStatus {
    /// Combine process status with a probe outcome
    pub fn worker_state(&self, probe_ok: bool) -> WorkerState {
        match self {
            ProcessStatus::NotStarted if !probe_ok => WorkerState::NotStarted,
            ProcessStatus::NotStarted => WorkerState::Ready,
            ProcessStatus::External => WorkerState::derive(None, probe_ok),
            ProcessStatus::Running { .. } => WorkerState::derive(Some(true), probe_ok),
            ProcessStatus::Exited { .. } => WorkerState::derive(Some(false), probe_ok),
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::External => write!(f, "external"),
            ProcessStatus::NotStarted => write!(f, "not_started"),
            ProcessStatus::Running { pid } => write!(f, "running (pid {pid})"),
            ProcessStatus::Exited { code: Some(code) } => write!(f, "exited (code {code})"),
            ProcessStatus::Exited { code: None } => write!(f, "exited"),
        }
    }
}

/// Local REST API of the wrapped backend
#[mockall::automock]
#[async_trait::async_trait]
pub trait BackendApi: Send + Sync {
    /// Single idempotent readiness probe.
    ///
    /// Every failure mode collapses to `false`; this never errors.
    async fn probe_ready(&self) -> bool;

    /// Request a new session id together with the backend version
    async fn new_session(&self) -> SupervisorResult<BackendSession>;

    /// Forward a call verbatim and return the backend's JSON body
    async fn forward(&self, request: &ForwardRequest, timeout: Duration) -> SupervisorResult<Value>;
}

/// Ownership of the backend child process
#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessSupervisor: Send + Sync {
    /// Start the backend if a launch is configured and it is not running.
    ///
    /// Returns the child's pid, or `None` when the backend is external.
    async fn launch(&self) -> SupervisorResult<Option<u32>>;

    /// Current process status, reaping the child if it exited
    async fn status(&self) -> ProcessStatus;

    /// Stop the child: polite signal first, kill after the grace period
    async fn terminate(&self) -> SupervisorResult<()>;
}
