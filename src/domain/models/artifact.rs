//! Artifact domain model.
//!
//! Exactly one artifact is produced per task attempt. Artifacts stream
//! through the event bus and are referenced from the capsule; the content is
//! the single deliverable file of the attempt.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{Task, TaskKind};

/// Identifier of one artifact attempt. Re-deliveries of the same task
/// produce distinct artifact ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub String);

impl ArtifactId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deliverable category of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    SourceCode,
    UnitTest,
    Document,
    InfraPlan,
    AnalysisReport,
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SourceCode => "source_code",
            Self::UnitTest => "unit_test",
            Self::Document => "document",
            Self::InfraPlan => "infra_plan",
            Self::AnalysisReport => "analysis_report",
        }
    }
}

impl From<TaskKind> for ArtifactType {
    fn from(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Codegen | TaskKind::Judgement => Self::SourceCode,
            TaskKind::Test => Self::UnitTest,
            TaskKind::Doc => Self::Document,
            TaskKind::Infra => Self::InfraPlan,
            TaskKind::Analyze => Self::AnalysisReport,
        }
    }
}

/// Output of one worker attempt for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub task: Task,
    #[serde(rename = "type")]
    pub kind: ArtifactType,
    pub content: String,
    /// Free-form attempt metadata: language, suggested path, provider, and
    /// the sandbox execution report when one ran.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(task: Task, content: impl Into<String>) -> Self {
        let kind = ArtifactType::from(task.kind);
        Self {
            id: ArtifactId::generate(),
            task,
            kind,
            content: content.into(),
            metadata: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Language hint: explicit metadata first, then a cheap content sniff.
    pub fn language(&self) -> String {
        if let Some(lang) = self.metadata_str("language") {
            return lang.to_string();
        }
        sniff_language(&self.content).to_string()
    }
}

/// Best-effort language detection for artifacts that arrive untagged.
pub fn sniff_language(content: &str) -> &'static str {
    let head: String = content.lines().take(20).collect::<Vec<_>>().join("\n");
    if head.contains("package ") && (head.contains("func ") || head.contains("import (")) {
        "go"
    } else if head.contains("fn ") && (head.contains("use ") || head.contains("let ")) {
        "rust"
    } else if head.contains("def ") || head.contains("import ") && head.contains(":") {
        "python"
    } else if head.contains("function ") || head.contains("const ") || head.contains("=>") {
        "javascript"
    } else if head.starts_with("FROM ") || head.contains("apiVersion:") || head.contains("resource ")
    {
        "infra"
    } else {
        "text"
    }
}
