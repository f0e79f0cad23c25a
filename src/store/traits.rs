//! Backend-agnostic `QueueStore` trait.
//!
//! The minimal surface the queue needs from a backing store: keyed reads,
//! whole-record updates, and an atomic claim. Backends are swappable without
//! touching queue or orchestrator logic.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreError;
use crate::job::Job;

/// Durable storage behind the job queue.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist a new job and append it to the pending FIFO.
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Atomically pop the oldest pending job and mark it running.
    ///
    /// This is the queue's sole mutual-exclusion point: two concurrent calls
    /// must never return the same job. Implementations mark the claim via
    /// `Job::begin_attempt` so the record returned is already `running` with
    /// a fresh `started_at`. Returns `None` when nothing is pending.
    async fn claim_next_pending(&self) -> Result<Option<Job>, StoreError>;

    /// Read a job snapshot by id.
    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Overwrite a stored job record.
    async fn update_job(&self, job: &Job) -> Result<(), StoreError>;

    /// Overwrite a stored job record and re-append it to the pending FIFO.
    async fn requeue_job(&self, job: &Job) -> Result<(), StoreError>;

    /// All jobs currently marked running (for crash-recovery sweeps).
    async fn list_running(&self) -> Result<Vec<Job>, StoreError>;
}
