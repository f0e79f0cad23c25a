//! Job entity, lifecycle state machine, and per-node result records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GraphError, ProtocolError, QueueError};
use crate::graph::TaskGraph;
use crate::intent::Intent;
use crate::protocol::{Message, MessageKind};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the queue.
    Pending,
    /// Claimed by an orchestrator.
    Running,
    /// Every node succeeded.
    Done,
    /// At least one node failed; eligible for retry.
    Failed,
    /// Cancelled by the caller.
    Cancelled,
}

impl JobStatus {
    /// Whether the state machine allows this transition.
    ///
    /// `failed -> pending` is deliberately absent: that edge exists only
    /// through `JobQueue::retry`, which owns the retry-budget check.
    pub fn can_transition_to(&self, target: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, target),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Done)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// Terminal states admit no further transitions. `Failed` is not
    /// terminal — it can re-enter the queue via retry.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A recorded state transition, kept on the job for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: JobStatus,
    pub to: JobStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Outcome of one executor invocation for one node. Append-only: results are
/// never mutated once recorded, and retries add new entries rather than
/// replacing old ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// The node this result belongs to.
    pub todo_id: String,
    /// Whether the executor reported success.
    pub success: bool,
    /// Executor output payload.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub output: serde_json::Value,
    /// Failure description; present iff `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When dispatch began.
    pub started_at: DateTime<Utc>,
    /// When the executor returned (or timed out).
    pub completed_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Record a successful node execution.
    pub fn success(
        todo_id: impl Into<String>,
        output: serde_json::Value,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            todo_id: todo_id.into(),
            success: true,
            output,
            error: None,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Record a failed node execution.
    pub fn failure(
        todo_id: impl Into<String>,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            todo_id: todo_id.into(),
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Render this result as a protocol report: `Done` on success, `Failure`
    /// otherwise, correlated to the conversation that assigned the work.
    pub fn to_report(
        &self,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        conversation_id: Uuid,
    ) -> Result<Message, ProtocolError> {
        if self.success {
            Message::with_conversation(
                MessageKind::Done,
                sender,
                receiver,
                serde_json::json!({ "result": self.output, "todo_id": self.todo_id }),
                conversation_id,
            )
        } else {
            Message::with_conversation(
                MessageKind::Failure,
                sender,
                receiver,
                serde_json::json!({
                    "error": self.error.as_deref().unwrap_or("unknown failure"),
                    "todo_id": self.todo_id,
                }),
                conversation_id,
            )
        }
    }
}

/// Cap on the per-job transition audit trail.
const MAX_TRANSITIONS: usize = 100;

/// The durable unit of scheduling.
///
/// Owned by the queue once enqueued; the orchestrator works on a snapshot
/// and writes back through queue operations, never holding the
/// authoritative copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job id.
    pub id: Uuid,
    /// The originating intent.
    pub intent: Intent,
    /// Finalized task graph; read-only for the job's lifetime.
    pub task_graph: TaskGraph,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the current attempt was claimed (fresh per attempt).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal or failed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Terminal failure reason, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Retries consumed so far.
    pub retry_count: u32,
    /// Retry budget.
    pub max_retries: u32,
    /// Result ledger: one entry per completed executor invocation, across
    /// all attempts, in completion order.
    #[serde(default)]
    pub results: Vec<ExecutionResult>,
    /// Capped state transition history.
    #[serde(default)]
    pub transitions: Vec<StateTransition>,
}

impl Job {
    /// Create a pending job from an intent and a finalized graph.
    pub fn new(intent: Intent, task_graph: TaskGraph) -> Result<Self, GraphError> {
        if !task_graph.is_finalized() {
            return Err(GraphError::NotFinalized);
        }
        Ok(Self {
            id: Uuid::new_v4(),
            intent,
            task_graph,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            retry_count: 0,
            max_retries: 0,
            results: Vec::new(),
            transitions: Vec::new(),
        })
    }

    /// Builder: set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Transition to a new status, enforcing the state machine.
    pub fn transition_to(
        &mut self,
        target: JobStatus,
        reason: Option<String>,
    ) -> Result<(), QueueError> {
        if !self.status.can_transition_to(target) {
            return Err(QueueError::InvalidTransition {
                id: self.id,
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        self.push_transition(target, reason);

        match target {
            // Each attempt gets a fresh started_at.
            JobStatus::Running => self.started_at = Some(Utc::now()),
            JobStatus::Done | JobStatus::Failed | JobStatus::Cancelled => {
                self.completed_at = Some(Utc::now());
            }
            JobStatus::Pending => {}
        }
        self.status = target;
        Ok(())
    }

    /// Force the job back to `pending`, bypassing the state machine. Used by
    /// the queue for retry and crash-recovery requeues only.
    pub(crate) fn force_pending(&mut self, reason: impl Into<String>) {
        self.push_transition(JobStatus::Pending, Some(reason.into()));
        self.status = JobStatus::Pending;
        self.completed_at = None;
    }

    /// Mark this job claimed by an orchestrator (pending -> running).
    pub(crate) fn begin_attempt(&mut self) -> Result<(), QueueError> {
        self.transition_to(JobStatus::Running, Some("claimed".to_string()))
    }

    /// Append an execution result to the ledger.
    pub fn record_result(&mut self, result: ExecutionResult) {
        self.results.push(result);
    }

    /// Whether a node already has a successful result on the ledger.
    /// Retries skip these nodes.
    pub fn has_succeeded(&self, todo_id: &str) -> bool {
        self.results.iter().any(|r| r.success && r.todo_id == todo_id)
    }

    /// Whether the retry budget is exhausted.
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    fn push_transition(&mut self, to: JobStatus, reason: Option<String>) {
        self.transitions.push(StateTransition {
            from: self.status,
            to,
            timestamp: Utc::now(),
            reason,
        });
        if self.transitions.len() > MAX_TRANSITIONS {
            let drain = self.transitions.len() - MAX_TRANSITIONS;
            self.transitions.drain(..drain);
        }
    }
}
