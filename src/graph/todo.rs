//! `ToDo` — one atomic unit of work inside a task graph.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Which executor a node is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    UiAutomation,
    LlmCall,
    ApiCall,
    DataExtract,
    Notify,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UiAutomation => "ui_automation",
            Self::LlmCall => "llm_call",
            Self::ApiCall => "api_call",
            Self::DataExtract => "data_extract",
            Self::Notify => "notify",
        };
        write!(f, "{s}")
    }
}

/// One atomic unit of work.
///
/// Ids are planner-assigned, unique within their graph, and double as the
/// deterministic tie-breaker in ordering. Dependency ids must resolve within
/// the same graph — enforced by `TaskGraph::finalize`, not at node
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToDo {
    /// Unique id within the owning graph.
    pub id: String,
    /// Selects the executor.
    pub action_type: ActionType,
    /// Executor-specific parameters.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Ids of nodes that must complete first.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<String>,
}

impl ToDo {
    /// Create a node with no parameters or dependencies.
    pub fn new(id: impl Into<String>, action_type: ActionType) -> Self {
        Self {
            id: id.into(),
            action_type,
            parameters: BTreeMap::new(),
            depends_on: BTreeSet::new(),
        }
    }

    /// Builder: add a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Builder: add a dependency.
    pub fn after(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.insert(dep.into());
        self
    }

    /// Look up a parameter by key.
    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.parameters.get(key)
    }
}
