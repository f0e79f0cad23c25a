//! libSQL `QueueStore` — durable backend over a local database file.
//!
//! The full `Job` rides as a JSON snapshot next to indexed `status` and
//! `queue_seq` columns; the claim is a single `UPDATE … RETURNING`, which is
//! what makes pop-and-mark atomic across processes sharing the file.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::job::Job;
use crate::store::traits::QueueStore;

/// libSQL-backed queue store.
///
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("failed to create store directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("failed to create connection: {e}")))?;

        let store = Self { conn };
        store.init_schema().await?;
        info!(path = %path.display(), "Job store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("failed to create in-memory database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("failed to create connection: {e}")))?;

        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS jobs (
                    id TEXT PRIMARY KEY,
                    status TEXT NOT NULL,
                    queue_seq INTEGER,
                    snapshot TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
                (),
            )
            .await
            .map_err(|e| StoreError::Open(format!("init_schema: {e}")))?;
        self.conn
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_jobs_status_seq ON jobs(status, queue_seq)",
                (),
            )
            .await
            .map_err(|e| StoreError::Open(format!("init_schema: {e}")))?;
        Ok(())
    }

    fn encode(job: &Job) -> Result<String, StoreError> {
        serde_json::to_string(job).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(snapshot: &str) -> Result<Job, StoreError> {
        serde_json::from_str(snapshot).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl QueueStore for LibSqlStore {
    async fn insert_job(&self, job: &Job) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO jobs (id, status, queue_seq, snapshot, created_at, updated_at)
                 VALUES (?1, ?2, (SELECT COALESCE(MAX(queue_seq), 0) + 1 FROM jobs), ?3, ?4, ?4)",
                params![
                    job.id.to_string(),
                    job.status.to_string(),
                    Self::encode(job)?,
                    now,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("insert_job: {e}")))?;

        debug!(job_id = %job.id, "Job inserted into store");
        Ok(())
    }

    async fn claim_next_pending(&self) -> Result<Option<Job>, StoreError> {
        let now = Utc::now().to_rfc3339();
        // Single-statement pop-and-mark: only one claimer can win the UPDATE.
        let mut rows = self
            .conn
            .query(
                "UPDATE jobs SET status = 'running', updated_at = ?1
                 WHERE id = (
                     SELECT id FROM jobs WHERE status = 'pending'
                     ORDER BY queue_seq ASC LIMIT 1
                 )
                 RETURNING snapshot",
                params![now],
            )
            .await
            .map_err(|e| StoreError::Query(format!("claim_next_pending: {e}")))?;

        let snapshot: String = match rows.next().await {
            Ok(Some(row)) => row
                .get(0)
                .map_err(|e| StoreError::Query(format!("claim_next_pending row: {e}")))?,
            Ok(None) => return Ok(None),
            Err(e) => return Err(StoreError::Query(format!("claim_next_pending: {e}"))),
        };

        let mut job = Self::decode(&snapshot)?;
        job.begin_attempt()
            .map_err(|e| StoreError::Query(format!("claim_next_pending mark: {e}")))?;
        self.update_job(&job).await?;

        debug!(job_id = %job.id, "Job claimed");
        Ok(Some(job))
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<Job>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT snapshot FROM jobs WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(format!("get_job: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let snapshot: String = row
                    .get(0)
                    .map_err(|e| StoreError::Query(format!("get_job row: {e}")))?;
                Ok(Some(Self::decode(&snapshot)?))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(StoreError::Query(format!("get_job: {e}"))),
        }
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE jobs SET status = ?1, snapshot = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    job.status.to_string(),
                    Self::encode(job)?,
                    now,
                    job.id.to_string(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("update_job: {e}")))?;

        if affected == 0 {
            return Err(StoreError::Query(format!("job {} not found", job.id)));
        }
        Ok(())
    }

    async fn requeue_job(&self, job: &Job) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn
            .execute(
                "UPDATE jobs SET status = ?1, snapshot = ?2, updated_at = ?3,
                        queue_seq = (SELECT COALESCE(MAX(queue_seq), 0) + 1 FROM jobs)
                 WHERE id = ?4",
                params![
                    job.status.to_string(),
                    Self::encode(job)?,
                    now,
                    job.id.to_string(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(format!("requeue_job: {e}")))?;

        if affected == 0 {
            return Err(StoreError::Query(format!("job {} not found", job.id)));
        }

        debug!(job_id = %job.id, "Job requeued");
        Ok(())
    }

    async fn list_running(&self) -> Result<Vec<Job>, StoreError> {
        let mut rows = self
            .conn
            .query("SELECT snapshot FROM jobs WHERE status = 'running'", ())
            .await
            .map_err(|e| StoreError::Query(format!("list_running: {e}")))?;

        let mut jobs = Vec::new();
        loop {
            match rows.next().await {
                Ok(Some(row)) => {
                    let snapshot: String = row
                        .get(0)
                        .map_err(|e| StoreError::Query(format!("list_running row: {e}")))?;
                    jobs.push(Self::decode(&snapshot)?);
                }
                Ok(None) => break,
                Err(e) => return Err(StoreError::Query(format!("list_running: {e}"))),
            }
        }
        Ok(jobs)
    }
}
