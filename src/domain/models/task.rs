//! Task domain model.
//!
//! Tasks are the unit of LLM + sandbox work. They form a DAG per intent and
//! are identified by string ids so that ensemble rewrites can derive child
//! ids (`{id}-{provider}`) and judgement ids (`{id}-judgement`) without
//! inventing a second id space.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::intent::IntentId;

/// Identifier of a task, unique within its intent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Id of the ensemble child executed by `provider`.
    pub fn ensemble_child(&self, provider: &str) -> Self {
        Self(format!("{}-{}", self.0, provider))
    }

    /// Id of the synthetic fan-in task for an ensemble.
    pub fn judgement(&self) -> Self {
        Self(format!("{}-judgement", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// What kind of work this task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Codegen,
    Infra,
    Test,
    Doc,
    Analyze,
    /// Fan-in over ensemble children; selects the best candidate output.
    Judgement,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Codegen => "codegen",
            Self::Infra => "infra",
            Self::Test => "test",
            Self::Doc => "doc",
            Self::Analyze => "analyze",
            Self::Judgement => "judgement",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "codegen" => Some(Self::Codegen),
            "infra" => Some(Self::Infra),
            "test" => Some(Self::Test),
            "doc" => Some(Self::Doc),
            "analyze" => Some(Self::Analyze),
            "judgement" => Some(Self::Judgement),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Priority level for tasks. Higher sorts first at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Status of a task in the execution pipeline.
///
/// The scheduler only distinguishes present (pending or in flight) from
/// absent (completed and removed from the graph); the richer states exist
/// for the wire contract with workers and the capsule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// A discrete unit of work inside an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub intent_id: IntentId,
    #[serde(rename = "type")]
    pub kind: TaskKind,
    pub description: String,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub priority: TaskPriority,
    /// Fan this task out to every configured provider at admission.
    #[serde(default)]
    pub ensemble: bool,
    /// Provider/model pinned by the ensemble rewrite.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
}

impl Task {
    pub fn new(intent_id: IntentId, kind: TaskKind, description: impl Into<String>) -> Self {
        Self {
            id: TaskId::generate(),
            intent_id,
            kind,
            description: description.into(),
            dependencies: Vec::new(),
            priority: TaskPriority::default(),
            ensemble: false,
            model: None,
            status: TaskStatus::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = TaskId(id.into());
        self
    }

    pub fn with_dependencies(mut self, deps: Vec<TaskId>) -> Self {
        self.dependencies = deps;
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ensemble(mut self) -> Self {
        self.ensemble = true;
        self
    }
}
