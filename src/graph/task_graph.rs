//! Dependency DAG over `ToDo` nodes: validation, ordering, wavefront batches.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::GraphError;
use crate::graph::todo::ToDo;

/// A directed acyclic graph of `ToDo` nodes keyed by id.
///
/// Built incrementally with `add_node`, validated and frozen with `finalize`.
/// Once finalized the graph is read-only and safe to share across concurrent
/// batch workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    nodes: BTreeMap<String, ToDo>,
    #[serde(default)]
    finalized: bool,
}

impl TaskGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            finalized: false,
        }
    }

    /// Add a node. Dependency ids are not checked here — that happens in
    /// `finalize`, so nodes may be added in any order.
    pub fn add_node(&mut self, todo: ToDo) -> Result<(), GraphError> {
        if self.finalized {
            return Err(GraphError::Frozen);
        }
        if self.nodes.contains_key(&todo.id) {
            return Err(GraphError::DuplicateNode { id: todo.id });
        }
        self.nodes.insert(todo.id.clone(), todo);
        Ok(())
    }

    /// Validate the graph and freeze it.
    ///
    /// Checks that every dependency resolves to a present node, then runs
    /// depth-first cycle detection. Idempotent on an already-finalized graph.
    pub fn finalize(&mut self) -> Result<(), GraphError> {
        if self.finalized {
            return Ok(());
        }

        for todo in self.nodes.values() {
            for dep in &todo.depends_on {
                if !self.nodes.contains_key(dep) {
                    return Err(GraphError::DanglingDependency {
                        node: todo.id.clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = self.find_cycle() {
            return Err(GraphError::CycleDetected { nodes: cycle });
        }

        self.finalized = true;
        debug!(nodes = self.nodes.len(), "Task graph finalized");
        Ok(())
    }

    /// Whether `finalize` has succeeded.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Look up a node by id.
    pub fn get(&self, id: &str) -> Option<&ToDo> {
        self.nodes.get(id)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids in ascending order.
    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.keys().map(String::as_str).collect()
    }

    /// Total order consistent with all edges — Kahn's algorithm, ties among
    /// simultaneously-ready nodes broken by ascending id.
    ///
    /// The cycle branch is a safety net; `finalize` catches cycles first.
    pub fn topological_order(&self) -> Result<Vec<String>, GraphError> {
        let mut indegree: BTreeMap<&str, usize> = self
            .nodes
            .values()
            .map(|t| (t.id.as_str(), t.depends_on.len()))
            .collect();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for todo in self.nodes.values() {
            for dep in &todo.depends_on {
                dependents.entry(dep.as_str()).or_default().push(&todo.id);
            }
        }

        let mut ready: BTreeSet<&str> = indegree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(&id, _)| id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_first() {
            order.push(id.to_string());
            for &dependent in dependents.get(id).into_iter().flatten() {
                if let Some(deg) = indegree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            let stuck: Vec<String> = self
                .nodes
                .keys()
                .filter(|id| !order.contains(*id))
                .cloned()
                .collect();
            return Err(GraphError::CycleDetected { nodes: stuck });
        }

        Ok(order)
    }

    /// Wavefront decomposition: batch `k` holds every node whose dependencies
    /// are fully satisfied by batches `0..k`. Nodes within a batch have no
    /// dependency relation to each other and may run concurrently; batches
    /// run strictly in sequence.
    pub fn parallel_batches(&self) -> Result<Vec<Vec<String>>, GraphError> {
        let mut remaining: BTreeSet<&str> = self.nodes.keys().map(String::as_str).collect();
        let mut satisfied: BTreeSet<&str> = BTreeSet::new();
        let mut batches = Vec::new();

        while !remaining.is_empty() {
            // BTreeSet iteration keeps each batch in ascending-id order.
            let batch: Vec<&str> = remaining
                .iter()
                .filter(|id| {
                    self.nodes[**id]
                        .depends_on
                        .iter()
                        .all(|dep| satisfied.contains(dep.as_str()))
                })
                .copied()
                .collect();

            if batch.is_empty() {
                return Err(GraphError::CycleDetected {
                    nodes: remaining.iter().map(|s| s.to_string()).collect(),
                });
            }

            for id in &batch {
                remaining.remove(id);
                satisfied.insert(*id);
            }
            batches.push(batch.into_iter().map(String::from).collect());
        }

        Ok(batches)
    }

    /// Depth-first search for a back-edge; returns the cycle's node ids.
    fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            InStack,
            Done,
        }

        fn visit<'a>(
            id: &'a str,
            nodes: &'a BTreeMap<String, ToDo>,
            marks: &mut BTreeMap<&'a str, Mark>,
            stack: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            marks.insert(id, Mark::InStack);
            stack.push(id);

            if let Some(todo) = nodes.get(id) {
                for dep in &todo.depends_on {
                    match marks.get(dep.as_str()).copied().unwrap_or(Mark::Unvisited) {
                        Mark::InStack => {
                            // Back-edge: the cycle runs from the dep's position
                            // on the stack back around to it.
                            let start = stack
                                .iter()
                                .position(|s| *s == dep.as_str())
                                .unwrap_or_default();
                            let mut cycle: Vec<String> =
                                stack[start..].iter().map(|s| s.to_string()).collect();
                            cycle.push(dep.clone());
                            return Some(cycle);
                        }
                        Mark::Unvisited => {
                            if let Some(cycle) = visit(dep, nodes, marks, stack) {
                                return Some(cycle);
                            }
                        }
                        Mark::Done => {}
                    }
                }
            }

            stack.pop();
            marks.insert(id, Mark::Done);
            None
        }

        let mut marks: BTreeMap<&str, Mark> = self
            .nodes
            .keys()
            .map(|k| (k.as_str(), Mark::Unvisited))
            .collect();
        let mut stack = Vec::new();

        let ids: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        for id in ids {
            if marks.get(id).copied() == Some(Mark::Unvisited)
                && let Some(cycle) = visit(id, &self.nodes, &mut marks, &mut stack)
            {
                return Some(cycle);
            }
        }
        None
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::todo::ActionType;

    fn node(id: &str) -> ToDo {
        ToDo::new(id, ActionType::ApiCall)
    }

    fn diamond() -> TaskGraph {
        // a -> {b, c} -> d
        let mut graph = TaskGraph::new();
        graph.add_node(node("a")).unwrap();
        graph.add_node(node("b").after("a")).unwrap();
        graph.add_node(node("c").after("a")).unwrap();
        graph.add_node(node("d").after("b").after("c")).unwrap();
        graph
    }

    #[test]
    fn duplicate_node_rejected() {
        let mut graph = TaskGraph::new();
        graph.add_node(node("a")).unwrap();
        assert!(matches!(
            graph.add_node(node("a")),
            Err(GraphError::DuplicateNode { id }) if id == "a"
        ));
    }

    #[test]
    fn dangling_dependency_rejected() {
        let mut graph = TaskGraph::new();
        graph.add_node(node("b").after("ghost")).unwrap();
        assert!(matches!(
            graph.finalize(),
            Err(GraphError::DanglingDependency { node, missing })
                if node == "b" && missing == "ghost"
        ));
    }

    #[test]
    fn two_node_cycle_names_both_ids() {
        let mut graph = TaskGraph::new();
        graph.add_node(node("a").after("b")).unwrap();
        graph.add_node(node("b").after("a")).unwrap();
        match graph.finalize() {
            Err(GraphError::CycleDetected { nodes }) => {
                assert!(nodes.contains(&"a".to_string()));
                assert!(nodes.contains(&"b".to_string()));
            }
            other => panic!("Expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let mut graph = TaskGraph::new();
        graph.add_node(node("a").after("a")).unwrap();
        assert!(matches!(
            graph.finalize(),
            Err(GraphError::CycleDetected { .. })
        ));
    }

    #[test]
    fn longer_cycle_detected_behind_valid_prefix() {
        let mut graph = TaskGraph::new();
        graph.add_node(node("a")).unwrap();
        graph.add_node(node("b").after("a").after("d")).unwrap();
        graph.add_node(node("c").after("b")).unwrap();
        graph.add_node(node("d").after("c")).unwrap();
        match graph.finalize() {
            Err(GraphError::CycleDetected { nodes }) => {
                for id in ["b", "c", "d"] {
                    assert!(nodes.contains(&id.to_string()), "missing {id} in {nodes:?}");
                }
            }
            other => panic!("Expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn finalize_freezes_graph() {
        let mut graph = TaskGraph::new();
        graph.add_node(node("a")).unwrap();
        graph.finalize().unwrap();
        assert!(graph.is_finalized());
        assert!(matches!(graph.add_node(node("b")), Err(GraphError::Frozen)));
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut graph = diamond();
        graph.finalize().unwrap();
        assert!(graph.finalize().is_ok());
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let mut graph = diamond();
        graph.finalize().unwrap();
        let order = graph.topological_order().unwrap();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn topological_order_ties_broken_by_id() {
        // a, then b and c both ready: b before c.
        let mut graph = TaskGraph::new();
        graph.add_node(node("a")).unwrap();
        graph.add_node(node("c").after("a")).unwrap();
        graph.add_node(node("b").after("a")).unwrap();
        graph.finalize().unwrap();
        assert_eq!(graph.topological_order().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn parallel_batches_diamond() {
        let mut graph = diamond();
        graph.finalize().unwrap();
        let batches = graph.parallel_batches().unwrap();
        assert_eq!(
            batches,
            vec![
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()],
                vec!["d".to_string()],
            ]
        );
    }

    #[test]
    fn parallel_batches_fan_out() {
        let mut graph = TaskGraph::new();
        graph.add_node(node("a")).unwrap();
        graph.add_node(node("b").after("a")).unwrap();
        graph.add_node(node("c").after("a")).unwrap();
        graph.finalize().unwrap();
        assert_eq!(
            graph.parallel_batches().unwrap(),
            vec![vec!["a".to_string()], vec!["b".to_string(), "c".to_string()]]
        );
    }

    #[test]
    fn parallel_batches_linear_chain() {
        let mut graph = TaskGraph::new();
        graph.add_node(node("n1")).unwrap();
        graph.add_node(node("n2").after("n1")).unwrap();
        graph.add_node(node("n3").after("n2")).unwrap();
        graph.add_node(node("n4").after("n3")).unwrap();
        graph.finalize().unwrap();

        let batches = graph.parallel_batches().unwrap();
        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|b| b.len() == 1));
    }

    #[test]
    fn parallel_batches_independent_nodes() {
        let mut graph = TaskGraph::new();
        for id in ["w", "x", "y", "z"] {
            graph.add_node(node(id)).unwrap();
        }
        graph.finalize().unwrap();

        let batches = graph.parallel_batches().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0], vec!["w", "x", "y", "z"]);
    }

    #[test]
    fn ordering_on_unfinalized_graph_still_works() {
        // Pure reads — callers gate on is_finalized() where it matters.
        let graph = diamond();
        assert_eq!(graph.topological_order().unwrap().len(), 4);
    }

    #[test]
    fn graph_serde_roundtrip() {
        let mut graph = diamond();
        graph.finalize().unwrap();
        let json = serde_json::to_string(&graph).unwrap();
        let parsed: TaskGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, graph);
        assert!(parsed.is_finalized());
    }
}
