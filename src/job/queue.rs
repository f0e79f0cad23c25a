//! `JobQueue` — durable FIFO of jobs with state-machine enforcement.
//!
//! All lifecycle rules live here, in front of the backing store: the store
//! only persists and claims, the queue decides what is allowed. Multiple
//! producers and multiple orchestrator workers may share one queue; the
//! store's atomic claim guarantees no job is handed out twice.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, QueueError};
use crate::graph::TaskGraph;
use crate::intent::Intent;
use crate::job::model::{ExecutionResult, Job, JobStatus};
use crate::store::QueueStore;

/// Durable job queue over a pluggable store.
pub struct JobQueue {
    store: Arc<dyn QueueStore>,
    default_max_retries: u32,
}

impl JobQueue {
    /// Create a queue over the given store.
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            default_max_retries: 3,
        }
    }

    /// Builder: retry budget assigned to jobs created via `submit`.
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Submission surface: build a job from an intent and a finalized graph,
    /// enqueue it, and hand back its id.
    pub async fn submit(&self, intent: Intent, task_graph: TaskGraph) -> Result<Uuid, Error> {
        let job = Job::new(intent, task_graph)?.with_max_retries(self.default_max_retries);
        let id = job.id;
        self.enqueue(job).await?;
        Ok(id)
    }

    /// Enqueue a pending job with a finalized graph.
    pub async fn enqueue(&self, job: Job) -> Result<(), QueueError> {
        if job.status != JobStatus::Pending {
            return Err(QueueError::InvalidJobState {
                id: job.id,
                state: job.status.to_string(),
                expected: JobStatus::Pending.to_string(),
            });
        }
        if !job.task_graph.is_finalized() {
            return Err(QueueError::InvalidJobState {
                id: job.id,
                state: "unfinalized graph".to_string(),
                expected: "finalized graph".to_string(),
            });
        }

        self.store.insert_job(&job).await?;
        info!(job_id = %job.id, intent = %job.intent.name, nodes = job.task_graph.len(), "Job enqueued");
        Ok(())
    }

    /// Pop the oldest pending job, atomically marking it running. Returns
    /// `None` when nothing is pending; callers poll or back off.
    pub async fn dequeue(&self) -> Result<Option<Job>, QueueError> {
        let claimed = self.store.claim_next_pending().await?;
        if let Some(ref job) = claimed {
            info!(job_id = %job.id, attempt = job.retry_count + 1, "Job dequeued");
        }
        Ok(claimed)
    }

    /// Read a job snapshot.
    pub async fn get_job(&self, id: Uuid) -> Result<Job, QueueError> {
        self.store
            .get_job(id)
            .await?
            .ok_or(QueueError::NotFound { id })
    }

    /// Read a job's current status.
    pub async fn get_status(&self, id: Uuid) -> Result<JobStatus, QueueError> {
        Ok(self.get_job(id).await?.status)
    }

    /// Transition a job, enforcing the state machine. A disallowed transition
    /// fails and leaves the stored record unchanged.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error: Option<String>,
    ) -> Result<Job, QueueError> {
        let mut job = self.get_job(id).await?;
        job.transition_to(status, error.clone())?;
        if error.is_some() {
            job.error = error;
        } else if status == JobStatus::Done {
            job.error = None;
        }
        self.store.update_job(&job).await?;

        info!(job_id = %id, status = %status, "Job status updated");
        Ok(job)
    }

    /// Append an execution result to a job's ledger.
    pub async fn append_result(&self, id: Uuid, result: ExecutionResult) -> Result<(), QueueError> {
        let mut job = self.get_job(id).await?;
        debug!(
            job_id = %id,
            todo_id = %result.todo_id,
            success = result.success,
            "Result recorded"
        );
        job.record_result(result);
        self.store.update_job(&job).await?;
        Ok(())
    }

    /// Re-enter a failed job into the queue, consuming one retry.
    ///
    /// The only path for `failed -> pending`. Prior attempts' results stay
    /// on the ledger for audit.
    pub async fn retry(&self, id: Uuid) -> Result<Job, QueueError> {
        let mut job = self.get_job(id).await?;

        if job.status != JobStatus::Failed {
            return Err(QueueError::InvalidTransition {
                id,
                from: job.status.to_string(),
                to: JobStatus::Pending.to_string(),
            });
        }
        if job.retries_exhausted() {
            return Err(QueueError::RetryExhausted {
                id,
                max: job.max_retries,
            });
        }

        job.retry_count += 1;
        job.error = None;
        job.force_pending("retry");
        self.store.requeue_job(&job).await?;

        info!(job_id = %id, retry_count = job.retry_count, "Job requeued for retry");
        Ok(job)
    }

    /// Cancel a pending or running job.
    ///
    /// On a running job this only records intent: the orchestrator observes
    /// the status cooperatively at batch boundaries and stops dispatching.
    pub async fn cancel(&self, id: Uuid) -> Result<Job, QueueError> {
        let mut job = self.get_job(id).await?;
        job.transition_to(JobStatus::Cancelled, Some("cancelled by caller".to_string()))?;
        self.store.update_job(&job).await?;

        info!(job_id = %id, "Job cancelled");
        Ok(job)
    }

    /// Crash-recovery sweep: return all `running` jobs to `pending`.
    ///
    /// Call once on startup before serving — a job marked running with no
    /// live orchestrator is an orphan from a previous process. At-least-once
    /// delivery means it simply runs again; succeeded nodes on its ledger
    /// are skipped by the next attempt.
    pub async fn reset_stale_running(&self) -> Result<usize, QueueError> {
        let running = self.store.list_running().await?;
        let count = running.len();
        if count == 0 {
            return Ok(0);
        }

        warn!(count, "Resetting stale running jobs to pending");
        for mut job in running {
            job.force_pending("stale reset");
            self.store.requeue_job(&job).await?;
        }
        Ok(count)
    }
}
