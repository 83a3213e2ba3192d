//! Capsule contract: the sealed deliverable for a completed intent.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::artifact::Artifact;
use super::intent::IntentId;
use super::task::Task;
use super::validation::{Severity, ValidationResult};

/// Capsule id: `QL-CAP-` + first 8 bytes of
/// `sha256(intent_id ∥ intent_text ∥ now)` in hex.
///
/// Deterministic only when the clock is pinned; production ids are opaque.
pub fn capsule_id(intent_id: &IntentId, intent_text: &str, now: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(intent_id.as_str().as_bytes());
    hasher.update(intent_text.as_bytes());
    hasher.update(now.to_rfc3339().as_bytes());
    let digest = hasher.finalize();
    format!("QL-CAP-{}", hex::encode(&digest[..8]))
}

/// Identity and headline numbers of a capsule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapsuleMetadata {
    pub capsule_id: String,
    pub intent_id: IntentId,
    pub intent_text: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Wall-clock duration in seconds.
    pub duration_secs: u64,
    pub total_tasks: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    pub overall_score: u8,
    pub quality_score: u8,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Per-type and per-agent execution breakdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// task type -> count of completed tasks of that type
    pub tasks_by_type: BTreeMap<String, usize>,
    /// provider/model -> tasks executed by it
    pub agent_utilization: BTreeMap<String, usize>,
    pub peak_cpu_percent: f64,
    pub peak_memory_bytes: u64,
    pub tasks_per_second: f64,
    pub average_task_duration_ms: f64,
}

/// Aggregated security posture of the deliverable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityReport {
    pub total_findings: usize,
    /// severity -> count
    pub findings_by_severity: BTreeMap<String, usize>,
    /// Maximum severity seen, or "none".
    pub overall_risk_level: String,
    pub findings: Vec<super::validation::SecurityFinding>,
}

impl SecurityReport {
    pub fn risk_level(max: Option<Severity>) -> String {
        max.map_or_else(|| "none".to_string(), |s| s.as_str().to_string())
    }
}

/// Estimated code-quality numbers for the deliverable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub lines_of_code: usize,
    /// Count of `if/for/while/switch/case/func` occurrences.
    pub cyclomatic_complexity: usize,
    /// `max(0, 100 - 2*complexity - loc/100)`
    pub maintainability_index: f64,
    pub average_quality_score: f64,
    pub average_security_score: f64,
}

/// Archive self-description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapsuleManifest {
    pub schema_version: String,
    /// archive path -> short description
    pub file_structure: BTreeMap<String, String>,
    pub runtime_requirements: Vec<String>,
}

impl Default for CapsuleManifest {
    fn default() -> Self {
        Self {
            schema_version: "1.0".to_string(),
            file_structure: BTreeMap::new(),
            runtime_requirements: Vec::new(),
        }
    }
}

/// The sealed, exportable deliverable for a completed intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QLCapsule {
    pub metadata: CapsuleMetadata,
    pub tasks: Vec<Task>,
    pub validation_results: Vec<ValidationResult>,
    pub execution_summary: ExecutionSummary,
    pub security_report: SecurityReport,
    pub quality_report: QualityReport,
    pub artifacts: Vec<Artifact>,
    pub manifest: CapsuleManifest,
    /// Merged file tree across all drops, when one could be assembled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unified_project: Option<BTreeMap<String, String>>,
}
