//! In-memory DAG store with TTL semantics.
//!
//! Entries are stored under the same keys a Redis-backed deployment would
//! use (`qlp:orchestrator:dag:{intent_id}`) and expire lazily on access.
//! Values are held as serialized bytes so every `get` decodes a fresh graph,
//! which keeps puts atomic with respect to gets.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::error::OrchestratorError;
use crate::domain::models::graph::TaskGraph;
use crate::domain::models::intent::IntentId;
use crate::domain::ports::dag_store::{dag_key, DagStore};

struct Entry {
    bytes: Vec<u8>,
    expires_at: Instant,
}

pub struct MemoryDagStore {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl MemoryDagStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Default 24h TTL.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(86_400))
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl DagStore for MemoryDagStore {
    async fn get(&self, intent_id: &IntentId) -> Result<Option<TaskGraph>, OrchestratorError> {
        let key = dag_key(intent_id);
        let mut entries = self.entries.write().await;
        match entries.get(&key) {
            None => Ok(None),
            Some(entry) if entry.expires_at <= Instant::now() => {
                debug!(%intent_id, "dag entry expired");
                entries.remove(&key);
                Ok(None)
            }
            Some(entry) => {
                let graph = TaskGraph::from_bytes(&entry.bytes)
                    .map_err(|e| OrchestratorError::Store(format!("corrupt dag for {key}: {e}")))?;
                Ok(Some(graph))
            }
        }
    }

    async fn set(&self, intent_id: &IntentId, graph: &TaskGraph) -> Result<(), OrchestratorError> {
        let bytes = graph
            .to_bytes()
            .map_err(|e| OrchestratorError::Store(format!("encode dag: {e}")))?;
        let mut entries = self.entries.write().await;
        entries.insert(
            dag_key(intent_id),
            Entry {
                bytes,
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, intent_id: &IntentId) -> Result<(), OrchestratorError> {
        self.entries.write().await.remove(&dag_key(intent_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::intent::IntentId;
    use crate::domain::models::task::{Task, TaskKind};

    fn graph_with_one_task() -> TaskGraph {
        let mut g = TaskGraph::new();
        g.add_task(
            Task::new(IntentId::from("i1"), TaskKind::Codegen, "one").with_id("a"),
        )
        .unwrap();
        g
    }

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let store = MemoryDagStore::with_default_ttl();
        let id = IntentId::from("i1");
        let graph = graph_with_one_task();

        store.set(&id, &graph).await.unwrap();
        let loaded = store.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded, graph);
    }

    #[tokio::test]
    async fn test_miss_is_none() {
        let store = MemoryDagStore::with_default_ttl();
        assert!(store.get(&IntentId::from("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let store = MemoryDagStore::with_default_ttl();
        let id = IntentId::from("i1");
        store.set(&id, &graph_with_one_task()).await.unwrap();
        store.delete(&id).await.unwrap();
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let store = MemoryDagStore::new(Duration::from_millis(20));
        let id = IntentId::from("i1");
        store.set(&id, &graph_with_one_task()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get(&id).await.unwrap().is_none());
        assert_eq!(store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_set_overwrites_atomically() {
        let store = MemoryDagStore::with_default_ttl();
        let id = IntentId::from("i1");
        let mut graph = graph_with_one_task();
        store.set(&id, &graph).await.unwrap();

        graph
            .add_task(Task::new(IntentId::from("i1"), TaskKind::Test, "two").with_id("b"))
            .unwrap();
        store.set(&id, &graph).await.unwrap();

        assert_eq!(store.get(&id).await.unwrap().unwrap().len(), 2);
    }
}
