//! Executor abstraction — the seam between scheduling and doing.

use async_trait::async_trait;

use crate::graph::{ActionType, ToDo};
use crate::job::ExecutionResult;

/// Performs the actual work for one action type.
///
/// Executors are infallible at the signature level: every failure mode —
/// including panic-worthy internal errors — must surface as an
/// `ExecutionResult` with `success = false` and an error description. The
/// orchestrator treats anything else as a bug in the executor, not in the
/// scheduling core. Retries may re-deliver a node; idempotency is the
/// executor's responsibility.
#[async_trait]
pub trait Executor: Send + Sync {
    /// The action type this executor handles.
    fn action_type(&self) -> ActionType;

    /// Execute one node to completion.
    async fn execute(&self, todo: &ToDo) -> ExecutionResult;
}
