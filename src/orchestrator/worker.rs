//! The orchestrator consumer loop.
//!
//! Dequeues jobs and drives their task graphs to a terminal state: batches
//! run strictly in sequence, nodes inside a batch run concurrently, and a
//! failure aborts the remaining batches while letting the current batch's
//! in-flight work finish. Cancellation is cooperative — the flag is read at
//! batch boundaries, never by preemption.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use rand::Rng;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::error::{ExecutionError, QueueError};
use crate::graph::ToDo;
use crate::job::{ExecutionResult, Job, JobQueue, JobStatus};
use crate::orchestrator::registry::ExecutorRegistry;

/// Consumes jobs from the queue and executes their graphs.
///
/// Multiple orchestrators may share one queue; the queue's atomic claim
/// keeps them from ever processing the same job. The orchestrator only ever
/// holds a working copy of a job — every mutation goes back through the
/// queue.
pub struct Orchestrator {
    config: SchedulerConfig,
    queue: Arc<JobQueue>,
    executors: Arc<ExecutorRegistry>,
    shutdown: AtomicBool,
}

impl Orchestrator {
    /// Create an orchestrator over a queue and an executor registry.
    pub fn new(
        config: SchedulerConfig,
        queue: Arc<JobQueue>,
        executors: Arc<ExecutorRegistry>,
    ) -> Self {
        Self {
            config,
            queue,
            executors,
            shutdown: AtomicBool::new(false),
        }
    }

    /// Ask the consumer loop to stop after the job it is currently on.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// The consumer loop. Runs until `shutdown` is called.
    ///
    /// Per-job errors are logged and swallowed — one bad job must not stop
    /// the loop from serving the rest of the queue.
    pub async fn run(&self) {
        info!(name = %self.config.name, "Orchestrator started");
        let mut backoff = self.config.poll_interval;

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.queue.dequeue().await {
                Ok(Some(job)) => {
                    backoff = self.config.poll_interval;
                    let job_id = job.id;
                    if let Err(e) = self.process_job(job).await {
                        error!(job_id = %job_id, error = %e, "Job processing error");
                    }
                }
                Ok(None) => self.idle_wait(&mut backoff).await,
                Err(e) => {
                    warn!(error = %e, "Dequeue failed");
                    self.idle_wait(&mut backoff).await;
                }
            }
        }
        info!(name = %self.config.name, "Orchestrator stopped");
    }

    /// Sleep with jitter, doubling the wait up to the configured cap.
    async fn idle_wait(&self, backoff: &mut Duration) {
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..100));
        tokio::time::sleep(*backoff + jitter).await;
        *backoff = (*backoff * 2).min(self.config.poll_backoff_max);
    }

    /// Drive one dequeued job to a terminal state.
    pub async fn process_job(&self, job: Job) -> Result<(), QueueError> {
        info!(
            job_id = %job.id,
            intent = %job.intent.name,
            nodes = job.task_graph.len(),
            attempt = job.retry_count + 1,
            "Processing job"
        );

        let batches = match job.task_graph.parallel_batches() {
            Ok(batches) => batches,
            // finalize() catches bad graphs before enqueue; if one slips
            // through, it fails this job, not the loop.
            Err(e) => {
                self.finish(job.id, JobStatus::Failed, Some(e.to_string()))
                    .await?;
                return Ok(());
            }
        };

        for batch in batches {
            if self.queue.get_status(job.id).await? == JobStatus::Cancelled {
                info!(job_id = %job.id, "Job cancelled, stopping before next batch");
                return Ok(());
            }

            // Retries resume from the point of failure: nodes that already
            // succeeded on a prior attempt are skipped.
            let pending: Vec<&ToDo> = batch
                .iter()
                .filter(|id| !job.has_succeeded(id.as_str()))
                .filter_map(|id| job.task_graph.get(id))
                .collect();
            if pending.is_empty() {
                continue;
            }

            let mut first_failure: Option<String> = None;
            for chunk in pending.chunks(self.config.max_batch_concurrency.max(1)) {
                let results = join_all(chunk.iter().map(|todo| self.dispatch(todo))).await;
                for result in results {
                    if !result.success && first_failure.is_none() {
                        first_failure = Some(format!(
                            "node {}: {}",
                            result.todo_id,
                            result.error.as_deref().unwrap_or("unknown failure")
                        ));
                    }
                    self.queue.append_result(job.id, result).await?;
                }
            }

            // Abort remaining batches on any failure; everything dispatched
            // in this batch has already finished and been recorded.
            if let Some(error) = first_failure {
                warn!(job_id = %job.id, error = %error, "Batch failed, aborting remaining batches");
                self.finish(job.id, JobStatus::Failed, Some(error)).await?;
                return Ok(());
            }
        }

        self.finish(job.id, JobStatus::Done, None).await?;
        Ok(())
    }

    /// Dispatch a single node to its executor, bounded by the node timeout.
    async fn dispatch(&self, todo: &ToDo) -> ExecutionResult {
        let started_at = Utc::now();

        let Some(executor) = self.executors.get(todo.action_type).await else {
            let err = ExecutionError::ExecutorMissing {
                action: todo.action_type.to_string(),
            };
            return ExecutionResult::failure(todo.id.clone(), err.to_string(), started_at);
        };

        debug!(todo_id = %todo.id, action = %todo.action_type, "Dispatching node");
        match tokio::time::timeout(self.config.node_timeout, executor.execute(todo)).await {
            Ok(mut result) => {
                // Executors must describe their failures; backfill if one doesn't.
                if !result.success && result.error.is_none() {
                    result.error = Some(
                        ExecutionError::Failed {
                            todo_id: todo.id.clone(),
                            reason: "executor reported failure without detail".to_string(),
                        }
                        .to_string(),
                    );
                }
                result
            }
            Err(_) => {
                let err = ExecutionError::Timeout {
                    todo_id: todo.id.clone(),
                    timeout: self.config.node_timeout,
                };
                ExecutionResult::failure(todo.id.clone(), err.to_string(), started_at)
            }
        }
    }

    /// Apply a terminal transition, tolerating a concurrent cancellation.
    async fn finish(
        &self,
        id: Uuid,
        target: JobStatus,
        error: Option<String>,
    ) -> Result<(), QueueError> {
        match self.queue.update_status(id, target, error).await {
            Ok(job) => {
                info!(job_id = %id, status = %job.status, results = job.results.len(), "Job finished");
                Ok(())
            }
            Err(e @ QueueError::InvalidTransition { .. }) => {
                // A cancel can land between the last batch and this write;
                // the job stays cancelled and its recorded results stand.
                if self.queue.get_status(id).await? == JobStatus::Cancelled {
                    info!(job_id = %id, "Job was cancelled during execution");
                    Ok(())
                } else {
                    Err(e)
                }
            }
            Err(e) => Err(e),
        }
    }
}
