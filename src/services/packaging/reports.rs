//! Capsule report builders: execution summary, security report, quality
//! report.

use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::domain::models::capsule::{ExecutionSummary, QualityReport, SecurityReport};
use crate::domain::models::validation::ValidationResult;
use crate::domain::ports::sandbox::ExecutionReport;

fn sandbox_report(result: &ValidationResult) -> Option<ExecutionReport> {
    let value = result.artifact.metadata.get("sandbox")?;
    serde_json::from_value(value.clone()).ok()
}

/// Per-type breakdown, agent utilization and sandbox peaks.
pub fn execution_summary(results: &[ValidationResult], duration: Duration) -> ExecutionSummary {
    let mut tasks_by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut agent_utilization: BTreeMap<String, usize> = BTreeMap::new();
    let mut peak_cpu: f64 = 0.0;
    let mut peak_memory: u64 = 0;
    let mut total_task_ms: u64 = 0;

    for result in results {
        let task = &result.artifact.task;
        *tasks_by_type
            .entry(task.kind.as_str().to_string())
            .or_default() += 1;

        let agent = result
            .artifact
            .metadata_str("provider")
            .map_or_else(|| "default".to_string(), str::to_string);
        *agent_utilization.entry(agent).or_default() += 1;

        if let Some(report) = sandbox_report(result) {
            peak_cpu = peak_cpu.max(report.peak_cpu_percent);
            peak_memory = peak_memory.max(report.peak_memory_bytes);
            total_task_ms += report.duration_ms.max(result.validation_time_ms);
        } else {
            total_task_ms += result.validation_time_ms;
        }
    }

    let secs = duration.as_secs_f64();
    let tasks_per_second = if secs > 0.0 {
        results.len() as f64 / secs
    } else {
        0.0
    };
    let average_task_duration_ms = if results.is_empty() {
        0.0
    } else {
        total_task_ms as f64 / results.len() as f64
    };

    ExecutionSummary {
        tasks_by_type,
        agent_utilization,
        peak_cpu_percent: peak_cpu,
        peak_memory_bytes: peak_memory,
        tasks_per_second,
        average_task_duration_ms,
    }
}

/// Aggregate all security findings; risk level is the maximum severity seen.
pub fn security_report(results: &[ValidationResult]) -> SecurityReport {
    let mut findings = Vec::new();
    let mut by_severity: BTreeMap<String, usize> = BTreeMap::new();

    for result in results {
        for finding in &result.security_findings {
            *by_severity
                .entry(finding.severity.as_str().to_string())
                .or_default() += 1;
            findings.push(finding.clone());
        }
    }

    let max = findings.iter().map(|f| f.severity).max();
    SecurityReport {
        total_findings: findings.len(),
        findings_by_severity: by_severity,
        overall_risk_level: SecurityReport::risk_level(max),
        findings,
    }
}

fn complexity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(if|for|while|switch|case|func)\b").expect("static pattern compiles")
    })
}

/// LOC, branch-keyword complexity and the derived maintainability index.
pub fn quality_report(results: &[ValidationResult]) -> QualityReport {
    let mut loc = 0usize;
    let mut complexity = 0usize;
    let mut quality_sum = 0u64;
    let mut security_sum = 0u64;

    for result in results {
        let content = &result.artifact.content;
        loc += content.lines().filter(|l| !l.trim().is_empty()).count();
        complexity += complexity_pattern().find_iter(content).count();
        quality_sum += u64::from(result.overall_score);
        security_sum += u64::from(
            result
                .component_scores
                .get("security")
                .copied()
                .unwrap_or(100),
        );
    }

    let maintainability_index =
        (100.0 - 2.0 * complexity as f64 - loc as f64 / 100.0).max(0.0);
    let count = results.len().max(1) as f64;

    QualityReport {
        lines_of_code: loc,
        cyclomatic_complexity: complexity,
        maintainability_index,
        average_quality_score: quality_sum as f64 / count,
        average_security_score: security_sum as f64 / count,
    }
}
