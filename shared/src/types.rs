//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Global process ID singleton - set once at startup
static PROCESS_ID: OnceLock<ProcessId> = OnceLock::new();

/// Identity stamped on every log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessId {
    /// The coordinator binary serving job requests
    Coordinator,
    /// The supervised SwarmUI process (used when re-emitting its output)
    Backend,
}

impl ProcessId {
    /// Initialize the global process ID for the coordinator
    pub fn init_coordinator() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Coordinator)
    }

    /// Get the global process ID, defaulting to the coordinator
    pub fn current() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Coordinator)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Coordinator => write!(f, "coordinator"),
            ProcessId::Backend => write!(f, "backend"),
        }
    }
}

/// Observed condition of the backend.
///
/// Never stored: every read re-derives it from the child handle and a fresh
/// probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// No backend process has been launched by this coordinator
    NotStarted,
    /// Process is alive but the probe does not succeed yet
    Starting,
    /// Probe returned a valid session
    Ready,
    /// Process exited, or an externally launched backend does not answer
    Unreachable,
}

impl WorkerState {
    /// Combine process liveness with a probe outcome.
    ///
    /// `process_alive` is `None` when the backend is launched outside this
    /// coordinator, in which case only the probe counts.
    pub fn derive(process_alive: Option<bool>, probe_ok: bool) -> Self {
        match (process_alive, probe_ok) {
            (_, true) => WorkerState::Ready,
            (Some(true), false) => WorkerState::Starting,
            (Some(false), false) => WorkerState::Unreachable,
            (None, false) => WorkerState::Unreachable,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::NotStarted => "not_started",
            WorkerState::Starting => "starting",
            WorkerState::Ready => "ready",
            WorkerState::Unreachable => "unreachable",
        };
        write!(f, "{s}")
    }
}
