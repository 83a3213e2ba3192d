//! Intent domain model.
//!
//! An intent is a user request plus its parsed task list. It is immutable
//! after submission except for status and the completion timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::Task;

/// Identifier of a submitted intent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntentId(pub String);

impl IntentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IntentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for IntentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle state of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Default for IntentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A user request plus its parsed task list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub id: IntentId,
    pub user_input: String,
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub status: IntentStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Intent {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            id: IntentId::generate(),
            user_input: user_input.into(),
            tasks: Vec::new(),
            status: IntentStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn with_tasks(mut self, tasks: Vec<Task>) -> Self {
        self.tasks = tasks;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::task::TaskKind;

    #[test]
    fn test_intent_defaults() {
        let intent = Intent::new("build a url shortener");
        assert_eq!(intent.status, IntentStatus::Pending);
        assert!(intent.tasks.is_empty());
        assert!(intent.completed_at.is_none());
    }

    #[test]
    fn test_intent_serde_round_trip() {
        let intent = Intent::new("ship it").with_tasks(vec![Task::new(
            IntentId::from("i1"),
            TaskKind::Doc,
            "write the readme",
        )]);
        let json = serde_json::to_string(&intent).unwrap();
        let back: Intent = serde_json::from_str(&json).unwrap();
        assert_eq!(intent, back);
    }
}
