//! Error types for the scheduling core.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the scheduling core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),
}

/// Message construction and codec errors.
///
/// Rejected at construction, never propagated into the graph or queue.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Payload for {kind} message must be a JSON object")]
    PayloadNotObject { kind: String },

    #[error("Payload for {kind} message is missing required field '{field}'")]
    MissingPayloadField { kind: String, field: String },

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Graph construction errors. Fatal to the graph — a graph that fails
/// validation must never be handed to a job.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Duplicate node id: {id}")]
    DuplicateNode { id: String },

    #[error("Node {node} depends on unknown node {missing}")]
    DanglingDependency { node: String, missing: String },

    #[error("Dependency cycle detected: {}", nodes.join(" -> "))]
    CycleDetected { nodes: Vec<String> },

    #[error("Graph is frozen; nodes cannot be added after finalize")]
    Frozen,

    #[error("Graph has not been finalized")]
    NotFinalized,
}

/// Job queue and state machine errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Job {id} not found")]
    NotFound { id: Uuid },

    #[error("Job {id} is {state}, expected {expected}")]
    InvalidJobState {
        id: Uuid,
        state: String,
        expected: String,
    },

    #[error("Job {id} cannot transition from {from} to {to}")]
    InvalidTransition { id: Uuid, from: String, to: String },

    #[error("Job {id} has exhausted its retry budget ({max} retries)")]
    RetryExhausted { id: Uuid, max: u32 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Storage backend errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Per-node execution failures. Folded into `ExecutionResult` records and the
/// job's terminal state — they never crash the orchestrator loop.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("No executor registered for action type {action}")]
    ExecutorMissing { action: String },

    #[error("Node {todo_id} timed out after {timeout:?}")]
    Timeout { todo_id: String, timeout: Duration },

    #[error("Node {todo_id} failed: {reason}")]
    Failed { todo_id: String, reason: String },
}

/// Result type alias for the scheduling core.
pub type Result<T> = std::result::Result<T, Error>;
