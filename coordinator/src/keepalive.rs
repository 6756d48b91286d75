//! Timed loops: waiting for the backend to come up and keeping it busy
//!
//! Both loops pace themselves with `tokio::time` so they yield to the
//! runtime between attempts and stop cleanly when their future is dropped.

use std::time::Duration;
use tokio::time::{self, Instant};

use shared::{KeepAliveSummary, MAX_ACTION_SECS, ProcessId, logging, process_debug, process_info, process_warn};
use supervisor::{BackendApi, ProcessStatus, ProcessSupervisor};

use crate::error::{CoordinatorError, CoordinatorResult};

/// Ping counters for one keep-alive run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KeepAliveSession {
    pub pings: u64,
    pub failures: u64,
}

impl KeepAliveSession {
    pub fn record(&mut self, ok: bool) {
        self.pings += 1;
        if !ok {
            self.failures += 1;
        }
    }

    pub fn summary(&self, duration: Duration) -> KeepAliveSummary {
        KeepAliveSummary {
            duration: duration.as_secs(),
            pings: self.pings,
            failures: self.failures,
        }
    }
}

/// Outcome of a successful readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyWait {
    pub attempts: u32,
    pub waited: Duration,
}

impl ReadyWait {
    /// Ready on the very first probe
    pub fn is_warm(&self) -> bool {
        self.attempts == 1
    }
}

/// Probe until the backend answers or `ceiling` elapses.
///
/// Probes are spaced `backoff` apart, the last one lands on the ceiling.
/// A supervised child that exits during the wait ends it immediately.
pub async fn wait_for_ready<B, P>(
    backend: &B,
    supervisor: &P,
    ceiling: Duration,
    backoff: Duration,
) -> CoordinatorResult<ReadyWait>
where
    B: BackendApi + ?Sized,
    P: ProcessSupervisor + ?Sized,
{
    let start = Instant::now();
    let Some(deadline) = start.checked_add(ceiling) else {
        return Err(CoordinatorError::config(
            "startup_timeout",
            format!("{}s is out of range", ceiling.as_secs()),
        ));
    };
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if backend.probe_ready().await {
            return Ok(ReadyWait {
                attempts,
                waited: start.elapsed(),
            });
        }

        if let ProcessStatus::Exited { code } = supervisor.status().await {
            return Err(CoordinatorError::BackendExited { code });
        }

        let now = Instant::now();
        if now >= deadline {
            process_warn!(
                ProcessId::current(),
                "⏱️ SwarmUI still not ready after {} probes ({}s)",
                attempts,
                ceiling.as_secs()
            );
            return Err(CoordinatorError::StartupTimeout { ceiling });
        }

        logging::log_progress(
            ProcessId::current(),
            "Waiting for SwarmUI",
            &format!("[{}s] attempt {} not ready yet", (now - start).as_secs(), attempts),
        );
        let wake_at = now.checked_add(backoff).map_or(deadline, |at| at.min(deadline));
        time::sleep_until(wake_at).await;
    }
}

/// Ping the backend every `interval` until `duration` has elapsed.
///
/// Pings land at `interval`, `2 * interval`, ... up to and including the
/// deadline. A ping that does not answer within one interval counts as a
/// failure, and slots it overran are skipped. Returns once the full
/// duration has passed. Both durations are capped at one day.
pub async fn run_keepalive<B>(backend: &B, duration: Duration, interval: Duration) -> KeepAliveSummary
where
    B: BackendApi + ?Sized,
{
    let longest = Duration::from_secs(MAX_ACTION_SECS);
    let duration = duration.min(longest);
    let interval = interval.min(longest);
    let start = Instant::now();
    let deadline = start + duration;
    let mut session = KeepAliveSession::default();
    let mut next_ping = start + interval;

    process_info!(
        ProcessId::current(),
        "💓 Keep-alive for {}s, pinging every {}s",
        duration.as_secs(),
        interval.as_secs()
    );

    while next_ping <= deadline {
        time::sleep_until(next_ping).await;

        let ok = time::timeout(interval, backend.probe_ready()).await.unwrap_or(false);
        session.record(ok);
        if ok {
            process_debug!(
                ProcessId::current(),
                "💓 Keep-alive ping {} ok ({}s elapsed)",
                session.pings,
                start.elapsed().as_secs()
            );
        } else {
            process_warn!(
                ProcessId::current(),
                "💔 Keep-alive ping {} failed ({} failures so far)",
                session.pings,
                session.failures
            );
        }

        next_ping += interval;
        let now = Instant::now();
        while next_ping < now {
            next_ping += interval;
        }
    }

    time::sleep_until(deadline).await;

    let summary = session.summary(duration);
    logging::log_success(
        ProcessId::current(),
        &format!(
            "Keep-alive finished: {} pings, {} failures over {}s",
            summary.pings, summary.failures, summary.duration
        ),
    );
    summary
}
