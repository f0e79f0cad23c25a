//! Executor registry keyed by action type.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::graph::ActionType;
use crate::orchestrator::executor::Executor;

/// Registry of executors, one per action type.
///
/// Populated at startup; the closed `ActionType` enum means there is no
/// runtime extension point, only explicit registration.
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<ActionType, Arc<dyn Executor>>>,
}

impl ExecutorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            executors: RwLock::new(HashMap::new()),
        }
    }

    /// Register an executor under its action type, replacing any previous one.
    pub async fn register(&self, executor: Arc<dyn Executor>) {
        let action = executor.action_type();
        if self
            .executors
            .write()
            .await
            .insert(action, executor)
            .is_some()
        {
            tracing::warn!(action = %action, "Replaced previously registered executor");
        } else {
            tracing::debug!(action = %action, "Registered executor");
        }
    }

    /// Get the executor for an action type.
    pub async fn get(&self, action: ActionType) -> Option<Arc<dyn Executor>> {
        self.executors.read().await.get(&action).cloned()
    }

    /// Check whether an action type has an executor.
    pub async fn has(&self, action: ActionType) -> bool {
        self.executors.read().await.contains_key(&action)
    }

    /// All registered action types, in stable order.
    pub async fn list(&self) -> Vec<ActionType> {
        let mut actions: Vec<ActionType> =
            self.executors.read().await.keys().copied().collect();
        actions.sort();
        actions
    }

    /// Number of registered executors.
    pub fn count(&self) -> usize {
        self.executors.try_read().map(|e| e.len()).unwrap_or(0)
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ToDo;
    use crate::job::ExecutionResult;
    use async_trait::async_trait;

    struct MockExecutor {
        action: ActionType,
    }

    #[async_trait]
    impl Executor for MockExecutor {
        fn action_type(&self) -> ActionType {
            self.action
        }
        async fn execute(&self, todo: &ToDo) -> ExecutionResult {
            ExecutionResult::success(todo.id.clone(), serde_json::json!("mock"), chrono::Utc::now())
        }
    }

    #[tokio::test]
    async fn register_and_get() {
        let registry = ExecutorRegistry::new();
        registry
            .register(Arc::new(MockExecutor {
                action: ActionType::ApiCall,
            }))
            .await;

        assert!(registry.has(ActionType::ApiCall).await);
        assert!(!registry.has(ActionType::Notify).await);
        assert!(registry.get(ActionType::ApiCall).await.is_some());
        assert!(registry.get(ActionType::LlmCall).await.is_none());
    }

    #[tokio::test]
    async fn list_and_count() {
        let registry = ExecutorRegistry::new();
        registry
            .register(Arc::new(MockExecutor {
                action: ActionType::Notify,
            }))
            .await;
        registry
            .register(Arc::new(MockExecutor {
                action: ActionType::ApiCall,
            }))
            .await;

        assert_eq!(registry.count(), 2);
        assert_eq!(
            registry.list().await,
            vec![ActionType::ApiCall, ActionType::Notify]
        );
    }

    #[tokio::test]
    async fn reregistering_replaces() {
        let registry = ExecutorRegistry::new();
        registry
            .register(Arc::new(MockExecutor {
                action: ActionType::ApiCall,
            }))
            .await;
        registry
            .register(Arc::new(MockExecutor {
                action: ActionType::ApiCall,
            }))
            .await;
        assert_eq!(registry.count(), 1);
    }
}
