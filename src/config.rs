//! Configuration types.

use std::time::Duration;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Orchestrator name for identification in logs.
    pub name: String,
    /// Base wait between dequeue polls when the queue is empty.
    pub poll_interval: Duration,
    /// Upper bound for the empty-queue backoff.
    pub poll_backoff_max: Duration,
    /// How long to wait for a single node's executor before treating it as failed.
    pub node_timeout: Duration,
    /// Default retry budget for submitted jobs.
    pub default_max_retries: u32,
    /// Maximum nodes dispatched concurrently within one batch.
    pub max_batch_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            name: "conductor".to_string(),
            poll_interval: Duration::from_millis(500),
            poll_backoff_max: Duration::from_secs(10),
            node_timeout: Duration::from_secs(60),
            default_max_retries: 3,
            max_batch_concurrency: 8,
        }
    }
}
