//! Quantum drop contract.
//!
//! A drop is a categorised bundle of files extracted from completed tasks:
//! one per deliverable category present in the intent's output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskId;

/// Deliverable category of a drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropType {
    Infrastructure,
    Codebase,
    Documentation,
    Testing,
    Analysis,
}

impl DropType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Infrastructure => "infrastructure",
            Self::Codebase => "codebase",
            Self::Documentation => "documentation",
            Self::Testing => "testing",
            Self::Analysis => "analysis",
        }
    }

    /// File-count threshold above which a human review is required.
    /// Analysis drops always require one.
    pub fn hitl_threshold(&self) -> Option<usize> {
        match self {
            Self::Infrastructure => Some(3),
            Self::Codebase => Some(5),
            Self::Analysis => None,
            Self::Documentation | Self::Testing => Some(usize::MAX),
        }
    }
}

impl std::fmt::Display for DropType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Review state of a drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropStatus {
    Pending,
    Ready,
    Approved,
    Rejected,
    Modified,
}

/// Aggregate facts about a drop's contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DropMetadata {
    pub file_count: usize,
    pub total_lines: usize,
    pub quality_score: u8,
    pub security_score: u8,
    pub validation_passed: bool,
    pub hitl_required: bool,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
}

/// A categorised bundle of files extracted from completed tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantumDrop {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: DropType,
    pub name: String,
    pub description: String,
    /// path -> file content
    pub files: BTreeMap<String, String>,
    /// directory -> file names under it
    pub structure: BTreeMap<String, Vec<String>>,
    pub metadata: DropMetadata,
    pub status: DropStatus,
    pub tasks: Vec<TaskId>,
}

impl QuantumDrop {
    pub fn new(kind: DropType, name: impl Into<String>) -> Self {
        Self {
            id: format!("drop-{}", Uuid::new_v4()),
            kind,
            name: name.into(),
            description: String::new(),
            files: BTreeMap::new(),
            structure: BTreeMap::new(),
            metadata: DropMetadata::default(),
            status: DropStatus::Pending,
            tasks: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hitl_thresholds() {
        assert_eq!(DropType::Infrastructure.hitl_threshold(), Some(3));
        assert_eq!(DropType::Codebase.hitl_threshold(), Some(5));
        assert_eq!(DropType::Analysis.hitl_threshold(), None);
    }

    #[test]
    fn test_drop_wire_format() {
        let drop = QuantumDrop::new(DropType::Codebase, "generated services");
        let json = serde_json::to_value(&drop).unwrap();
        assert_eq!(json["type"], "codebase");
        assert_eq!(json["status"], "pending");
    }
}
