//! Coordinator state management
//!
//! Only bookkeeping lives here. Backend readiness is never cached; it is
//! re-derived from a probe every time it is needed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// Counters and the recorded shutdown intent
#[derive(Debug)]
pub struct CoordinatorState {
    started_at: Instant,
    shutdown_requested_at: OnceLock<DateTime<Utc>>,
    actions_handled: AtomicU64,
    active_keepalives: AtomicUsize,
}

/// Point-in-time view for the transport's health endpoint
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StateSnapshot {
    pub uptime_seconds: u64,
    pub actions_handled: u64,
    pub active_keepalives: usize,
    pub shutdown_requested: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shutdown_requested_at: Option<DateTime<Utc>>,
}

/// Decrements the active keep-alive count when dropped, including on cancellation
pub struct KeepAliveGuard<'a> {
    state: &'a CoordinatorState,
}

impl Drop for KeepAliveGuard<'_> {
    fn drop(&mut self) {
        self.state.active_keepalives.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for CoordinatorState {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinatorState {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            shutdown_requested_at: OnceLock::new(),
            actions_handled: AtomicU64::new(0),
            active_keepalives: AtomicUsize::new(0),
        }
    }

    /// Record the caller's intent to release the worker.
    ///
    /// Returns `true` only for the first request.
    pub fn request_shutdown(&self) -> bool {
        self.shutdown_requested_at.set(Utc::now()).is_ok()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested_at.get().is_some()
    }

    pub fn record_action(&self) -> u64 {
        self.actions_handled.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn begin_keepalive(&self) -> KeepAliveGuard<'_> {
        self.active_keepalives.fetch_add(1, Ordering::SeqCst);
        KeepAliveGuard { state: self }
    }

    pub fn active_keepalives(&self) -> usize {
        self.active_keepalives.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            uptime_seconds: self.started_at.elapsed().as_secs(),
            actions_handled: self.actions_handled.load(Ordering::SeqCst),
            active_keepalives: self.active_keepalives(),
            shutdown_requested: self.shutdown_requested(),
            shutdown_requested_at: self.shutdown_requested_at.get().copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_is_recorded_once() {
        let state = CoordinatorState::new();
        assert!(!state.shutdown_requested());

        assert!(state.request_shutdown());
        let first = state.snapshot().shutdown_requested_at;
        assert!(!state.request_shutdown());

        assert!(state.shutdown_requested());
        assert_eq!(state.snapshot().shutdown_requested_at, first);
    }

    #[test]
    fn test_keepalive_guard_tracks_active_loops() {
        let state = CoordinatorState::new();
        {
            let _a = state.begin_keepalive();
            let _b = state.begin_keepalive();
            assert_eq!(state.active_keepalives(), 2);
        }
        assert_eq!(state.active_keepalives(), 0);
    }

    #[test]
    fn test_snapshot_counts_actions() {
        let state = CoordinatorState::new();
        state.record_action();
        state.record_action();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.actions_handled, 2);
        assert!(!snapshot.shutdown_requested);
        assert!(snapshot.shutdown_requested_at.is_none());
    }
}
