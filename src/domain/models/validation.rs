//! Validation result contract.
//!
//! Scored, pass/fail assessment of one artifact, produced by the validation
//! engine and consumed by the scheduler and the packaging engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::artifact::Artifact;

/// Severity scale shared by issues and security findings.
///
/// Ordering is by impact: `Critical` is the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Penalty applied to a base-100 component score.
    pub fn penalty(&self) -> u32 {
        match self {
            Self::Critical => 50,
            Self::High => 20,
            Self::Medium => 10,
            Self::Low => 2,
            Self::Info => 0,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Location of a match inside an artifact's content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLocation {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

/// One quality/correctness finding from pattern analysis or critique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub rule_id: String,
    pub title: String,
    pub severity: Severity,
    pub category: String,
    pub location: IssueLocation,
    pub suggestion: String,
    /// Match confidence in [0, 1]; matches below the engine threshold are
    /// discarded before they reach this type.
    pub confidence: f64,
}

/// One security finding, kept separate from ordinary issues because critical
/// findings gate the pass decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityFinding {
    pub rule_id: String,
    pub description: String,
    pub severity: Severity,
    pub location: IssueLocation,
    pub recommendation: String,
}

/// Scored assessment of one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub artifact: Artifact,
    pub passed: bool,
    /// Weighted overall score in [0, 100].
    pub overall_score: u8,
    pub component_scores: BTreeMap<String, u8>,
    pub issues: Vec<Issue>,
    pub security_findings: Vec<SecurityFinding>,
    pub validated_at: DateTime<Utc>,
    /// Wall-clock validation duration in milliseconds.
    pub validation_time_ms: u64,
}

impl ValidationResult {
    /// Highest severity present across security findings, if any.
    pub fn max_security_severity(&self) -> Option<Severity> {
        self.security_findings.iter().map(|f| f.severity).max()
    }

    pub fn has_critical_finding(&self) -> bool {
        self.max_security_severity() == Some(Severity::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering_and_penalties() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Info < Severity::Low);
        assert_eq!(Severity::Critical.penalty(), 50);
        assert_eq!(Severity::High.penalty(), 20);
        assert_eq!(Severity::Medium.penalty(), 10);
        assert_eq!(Severity::Low.penalty(), 2);
        assert_eq!(Severity::Info.penalty(), 0);
    }

    #[test]
    fn test_severity_wire_format() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        let sev: Severity = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(sev, Severity::High);
    }
}
