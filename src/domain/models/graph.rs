//! Per-intent task dependency graph.
//!
//! Nodes own their `Task` and adjacency is id-keyed in both directions.
//! Ordered maps keep the serialized form byte-stable, so a graph can round
//! trip through the state store and compare bit-identically.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::task::{Task, TaskId};

/// Graph construction and mutation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("task {0} is already present in the graph")]
    DuplicateTask(TaskId),
    #[error("edge endpoint {0} does not exist")]
    MissingEndpoint(TaskId),
    #[error("self-edge on {0} is not allowed")]
    SelfEdge(TaskId),
    #[error("edge {from} -> {to} would introduce a cycle")]
    WouldCycle { from: TaskId, to: TaskId },
}

/// Directed acyclic graph of tasks for a single intent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    nodes: BTreeMap<TaskId, Task>,
    /// Incoming edges: node -> set of tasks it depends on.
    parents: BTreeMap<TaskId, BTreeSet<TaskId>>,
    /// Outgoing edges: node -> set of tasks depending on it.
    children: BTreeMap<TaskId, BTreeSet<TaskId>>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node. Ids are unique within an intent.
    pub fn add_task(&mut self, task: Task) -> Result<(), GraphError> {
        if self.nodes.contains_key(&task.id) {
            return Err(GraphError::DuplicateTask(task.id));
        }
        self.parents.insert(task.id.clone(), BTreeSet::new());
        self.children.insert(task.id.clone(), BTreeSet::new());
        self.nodes.insert(task.id.clone(), task);
        Ok(())
    }

    /// Insert the edge `from -> to` (`to` depends on `from`).
    ///
    /// Fails when either endpoint is missing, the endpoints are equal, or the
    /// edge would close a cycle. Inserting an existing edge is a no-op.
    pub fn add_edge(&mut self, from: &TaskId, to: &TaskId) -> Result<(), GraphError> {
        if !self.nodes.contains_key(from) {
            return Err(GraphError::MissingEndpoint(from.clone()));
        }
        if !self.nodes.contains_key(to) {
            return Err(GraphError::MissingEndpoint(to.clone()));
        }
        if from == to {
            return Err(GraphError::SelfEdge(from.clone()));
        }
        if self.reaches(to, from) {
            return Err(GraphError::WouldCycle {
                from: from.clone(),
                to: to.clone(),
            });
        }
        if let Some(out) = self.children.get_mut(from) {
            out.insert(to.clone());
        }
        if let Some(in_set) = self.parents.get_mut(to) {
            in_set.insert(from.clone());
        }
        Ok(())
    }

    /// Whether `target` is reachable from `start` following out-edges.
    fn reaches(&self, start: &TaskId, target: &TaskId) -> bool {
        if start == target {
            return true;
        }
        let mut queue: VecDeque<&TaskId> = VecDeque::new();
        let mut seen: BTreeSet<&TaskId> = BTreeSet::new();
        queue.push_back(start);
        while let Some(id) = queue.pop_front() {
            if let Some(next) = self.children.get(id) {
                for child in next {
                    if child == target {
                        return true;
                    }
                    if seen.insert(child) {
                        queue.push_back(child);
                    }
                }
            }
        }
        false
    }

    /// Exactly the nodes with empty in-set, in id order.
    ///
    /// Consumers must treat the result as unordered; dispatch applies its own
    /// priority-then-id ordering.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        self.parents
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .filter_map(|(id, _)| self.nodes.get(id))
            .collect()
    }

    /// Remove a completed node and every incident edge. Unknown ids are a
    /// no-op, which makes redelivered completion events harmless.
    pub fn mark_complete(&mut self, id: &TaskId) -> bool {
        if self.nodes.remove(id).is_none() {
            return false;
        }
        if let Some(deps) = self.parents.remove(id) {
            for dep in deps {
                if let Some(out) = self.children.get_mut(&dep) {
                    out.remove(id);
                }
            }
        }
        if let Some(dependents) = self.children.remove(id) {
            for dependent in dependents {
                if let Some(in_set) = self.parents.get_mut(&dependent) {
                    in_set.remove(id);
                }
            }
        }
        true
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.nodes.get(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.nodes.values()
    }

    pub fn dependencies_of(&self, id: &TaskId) -> Option<&BTreeSet<TaskId>> {
        self.parents.get(id)
    }

    pub fn dependents_of(&self, id: &TaskId) -> Option<&BTreeSet<TaskId>> {
        self.children.get(id)
    }

    /// Byte-stable serialized form; `from_bytes` reconstructs an equal graph.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
