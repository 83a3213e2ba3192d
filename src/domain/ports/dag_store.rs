//! State store port: durable intent-id -> task graph map.

use async_trait::async_trait;

use crate::domain::error::OrchestratorError;
use crate::domain::models::graph::TaskGraph;
use crate::domain::models::intent::IntentId;

/// Storage key for an intent's graph.
pub fn dag_key(intent_id: &IntentId) -> String {
    format!("qlp:orchestrator:dag:{intent_id}")
}

/// Durable key->DAG map with a TTL. Puts are atomic with respect to gets.
/// A miss means the intent is completed or unknown; the scheduler treats
/// both the same way.
#[async_trait]
pub trait DagStore: Send + Sync {
    async fn get(&self, intent_id: &IntentId) -> Result<Option<TaskGraph>, OrchestratorError>;

    async fn set(&self, intent_id: &IntentId, graph: &TaskGraph)
        -> Result<(), OrchestratorError>;

    async fn delete(&self, intent_id: &IntentId) -> Result<(), OrchestratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dag_key_shape() {
        assert_eq!(
            dag_key(&IntentId::from("abc-123")),
            "qlp:orchestrator:dag:abc-123"
        );
    }
}
