//! In-memory registry of background jobs submitted through `/run`

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use uuid::Uuid;

/// Lifecycle of a job, spelled the way job platforms report it
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// Public view of one job
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct JobView {
    pub id: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

struct JobEntry {
    view: JobView,
    abort: Option<AbortHandle>,
}

/// Job counts by status
#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub in_queue: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// Shared job table; finished jobs are dropped after `retention`
#[derive(Clone)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<Uuid, JobEntry>>>,
    retention: Duration,
}

impl JobRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    /// Register a queued job and return its id
    pub async fn submit(&self, action: Option<String>) -> Uuid {
        let id = Uuid::new_v4();
        let view = JobView {
            id,
            status: JobStatus::InQueue,
            action,
            output: None,
            error: None,
            submitted_at: Utc::now(),
            finished_at: None,
        };

        let mut jobs = self.jobs.write().await;
        self.prune(&mut jobs);
        jobs.insert(id, JobEntry { view, abort: None });
        id
    }

    /// Attach the task handle so the job can be cancelled
    pub async fn attach(&self, id: Uuid, abort: AbortHandle) {
        if let Some(entry) = self.jobs.write().await.get_mut(&id) {
            if entry.view.status.is_finished() {
                abort.abort();
            } else {
                entry.abort = Some(abort);
            }
        }
    }

    pub async fn start(&self, id: Uuid) {
        if let Some(entry) = self.jobs.write().await.get_mut(&id) {
            if entry.view.status == JobStatus::InQueue {
                entry.view.status = JobStatus::InProgress;
            }
        }
    }

    pub async fn complete(&self, id: Uuid, output: Value) {
        self.finish(id, JobStatus::Completed, Some(output), None).await;
    }

    pub async fn fail(&self, id: Uuid, error: impl Into<String>) {
        self.finish(id, JobStatus::Failed, None, Some(error.into())).await;
    }

    /// Abort a running job; returns `None` for unknown ids
    pub async fn cancel(&self, id: Uuid) -> Option<JobView> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&id)?;
        if !entry.view.status.is_finished() {
            if let Some(abort) = entry.abort.take() {
                abort.abort();
            }
            entry.view.status = JobStatus::Cancelled;
            entry.view.finished_at = Some(Utc::now());
        }
        Some(entry.view.clone())
    }

    pub async fn get(&self, id: Uuid) -> Option<JobView> {
        self.jobs.read().await.get(&id).map(|entry| entry.view.clone())
    }

    pub async fn counts(&self) -> JobCounts {
        let jobs = self.jobs.read().await;
        let mut counts = JobCounts::default();
        for entry in jobs.values() {
            match entry.view.status {
                JobStatus::InQueue => counts.in_queue += 1,
                JobStatus::InProgress => counts.in_progress += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }

    async fn finish(&self, id: Uuid, status: JobStatus, output: Option<Value>, error: Option<String>) {
        if let Some(entry) = self.jobs.write().await.get_mut(&id) {
            // a cancelled job keeps its status even if the task raced to the end
            if entry.view.status.is_finished() {
                return;
            }
            entry.view.status = status;
            entry.view.output = output;
            entry.view.error = error;
            entry.view.finished_at = Some(Utc::now());
            entry.abort = None;
        }
    }

    fn prune(&self, jobs: &mut HashMap<Uuid, JobEntry>) {
        let Ok(retention) = chrono::Duration::from_std(self.retention) else {
            return;
        };
        let cutoff = Utc::now() - retention;
        jobs.retain(|_, entry| match entry.view.finished_at {
            Some(finished) => finished > cutoff,
            None => true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_job_lifecycle() {
        let registry = JobRegistry::new(Duration::from_secs(3600));
        let id = registry.submit(Some("health".to_string())).await;
        assert_eq!(registry.get(id).await.unwrap().status, JobStatus::InQueue);

        registry.start(id).await;
        assert_eq!(registry.get(id).await.unwrap().status, JobStatus::InProgress);

        registry.complete(id, json!({"healthy": true})).await;
        let view = registry.get(id).await.unwrap();
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.output, Some(json!({"healthy": true})));
        assert!(view.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_aborts_task_and_sticks() {
        let registry = JobRegistry::new(Duration::from_secs(3600));
        let id = registry.submit(Some("keepalive".to_string())).await;
        let task = tokio::spawn(async { tokio::time::sleep(Duration::from_secs(3600)).await });
        registry.attach(id, task.abort_handle()).await;
        registry.start(id).await;

        let view = registry.cancel(id).await.unwrap();
        assert_eq!(view.status, JobStatus::Cancelled);
        assert!(task.await.unwrap_err().is_cancelled());

        registry.complete(id, json!({"success": true})).await;
        assert_eq!(registry.get(id).await.unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let registry = JobRegistry::new(Duration::from_secs(3600));
        assert!(registry.get(Uuid::new_v4()).await.is_none());
        assert!(registry.cancel(Uuid::new_v4()).await.is_none());
    }

    #[tokio::test]
    async fn test_finished_jobs_are_pruned_after_retention() {
        let registry = JobRegistry::new(Duration::ZERO);
        let old = registry.submit(None).await;
        registry.fail(old, "boom").await;
        let running = registry.submit(None).await;
        registry.start(running).await;

        // the next submission prunes everything finished before it
        registry.submit(None).await;

        assert!(registry.get(old).await.is_none());
        assert!(registry.get(running).await.is_some());
        let counts = registry.counts().await;
        assert_eq!(counts.in_progress, 1);
        assert_eq!(counts.in_queue, 1);
        assert_eq!(counts.failed, 0);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_value(JobStatus::InProgress).unwrap(), json!("IN_PROGRESS"));
        assert_eq!(serde_json::to_value(JobStatus::InQueue).unwrap(), json!("IN_QUEUE"));
    }
}
