//! In-memory `QueueStore` — a FIFO plus keyed map under a single lock.
//!
//! The default backend for tests and single-process embedders. One mutex
//! guards both structures, which is what makes `claim_next_pending` a single
//! atomic pop-and-mark.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::job::{Job, JobStatus};
use crate::store::traits::QueueStore;

#[derive(Default)]
struct Inner {
    fifo: VecDeque<Uuid>,
    jobs: HashMap<Uuid, Job>,
}

/// In-memory queue store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs (all statuses).
    pub async fn len(&self) -> usize {
        self.inner.lock().await.jobs.len()
    }

    /// Whether the store holds no jobs.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.jobs.is_empty()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.jobs.contains_key(&job.id) {
            return Err(StoreError::Query(format!("job {} already exists", job.id)));
        }
        inner.fifo.push_back(job.id);
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn claim_next_pending(&self) -> Result<Option<Job>, StoreError> {
        let mut inner = self.inner.lock().await;
        // Ids of jobs cancelled while queued linger in the FIFO; skip and
        // drop them here.
        while let Some(id) = inner.fifo.pop_front() {
            let Some(job) = inner.jobs.get_mut(&id) else {
                continue;
            };
            if job.status != JobStatus::Pending {
                continue;
            }
            job.begin_attempt()
                .map_err(|e| StoreError::Query(format!("claim failed: {e}")))?;
            return Ok(Some(job.clone()));
        }
        Ok(None)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.lock().await.jobs.get(&id).cloned())
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.jobs.contains_key(&job.id) {
            return Err(StoreError::Query(format!("job {} not found", job.id)));
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn requeue_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.jobs.contains_key(&job.id) {
            return Err(StoreError::Query(format!("job {} not found", job.id)));
        }
        inner.jobs.insert(job.id, job.clone());
        inner.fifo.push_back(job.id);
        Ok(())
    }

    async fn list_running(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .cloned()
            .collect())
    }
}
