//! Quantum drop generation.
//!
//! Groups completed task outputs into per-category bundles using the
//! path/content heuristics table, re-homing code files into canonical
//! directories and flagging large drops for human review.

use std::collections::BTreeMap;

use crate::domain::models::drop::{DropMetadata, DropStatus, DropType, QuantumDrop};
use crate::domain::models::validation::ValidationResult;

use super::unified;

const SOURCE_EXTENSIONS: &[&str] = &[
    ".go", ".rs", ".py", ".js", ".ts", ".java", ".c", ".cc", ".cpp", ".h", ".rb", ".kt",
];

/// Path/content heuristics table from the packaging contract.
pub fn classify(path: &str, content: &str) -> DropType {
    let lowered = path.to_lowercase();

    if lowered.contains("dockerfile")
        || lowered.contains("docker-compose")
        || lowered.ends_with(".yaml")
        || lowered.ends_with(".yml")
        || lowered.ends_with(".tf")
        || content.starts_with("FROM ")
        || content.starts_with("apiVersion:")
        || content.starts_with("resource ")
    {
        return DropType::Infrastructure;
    }
    if lowered.contains("test") || lowered.contains("_test.") {
        return DropType::Testing;
    }
    if lowered.contains("analysis") || lowered.contains("report") {
        return DropType::Analysis;
    }
    if SOURCE_EXTENSIONS.iter().any(|ext| lowered.ends_with(ext)) {
        return DropType::Codebase;
    }
    DropType::Documentation
}

fn technologies_in(content: &str, language: &str) -> Vec<String> {
    let mut techs = Vec::new();
    let mut push = |t: &str| {
        if !techs.iter().any(|x| x == t) {
            techs.push(t.to_string());
        }
    };
    if !language.is_empty() && language != "text" && language != "infra" {
        push(language);
    }
    if content.starts_with("FROM ") || content.contains("docker") {
        push("docker");
    }
    if content.contains("apiVersion:") || content.contains("kind:") {
        push("kubernetes");
    }
    if content.starts_with("resource ") || content.contains("terraform") {
        push("terraform");
    }
    techs
}

fn dependencies_in(content: &str, language: &str) -> Vec<String> {
    let mut deps = Vec::new();
    for line in content.lines().take(50) {
        let trimmed = line.trim();
        let dep = match language {
            "go" => trimmed
                .strip_prefix("import ")
                .map(|rest| rest.trim_matches(['"', '(', ')'])),
            "python" => trimmed
                .strip_prefix("import ")
                .or_else(|| trimmed.strip_prefix("from ").map(|r| r.split(' ').next().unwrap_or(r))),
            "javascript" => trimmed
                .split("require(")
                .nth(1)
                .map(|rest| rest.trim_matches(['\'', '"', ')', ';'])),
            "rust" => trimmed
                .strip_prefix("use ")
                .map(|rest| rest.split("::").next().unwrap_or(rest).trim_end_matches(';')),
            _ => None,
        };
        if let Some(dep) = dep {
            let dep = dep.trim();
            if !dep.is_empty() && !deps.iter().any(|d| d == dep) {
                deps.push(dep.to_string());
            }
        }
    }
    deps
}

/// Build one drop per deliverable category present in `results`.
pub fn build_drops(results: &[ValidationResult]) -> Vec<QuantumDrop> {
    #[derive(Default)]
    struct Bucket {
        files: BTreeMap<String, String>,
        tasks: Vec<crate::domain::models::task::TaskId>,
        scores: Vec<u8>,
        security_scores: Vec<u8>,
        all_passed: bool,
        dependencies: Vec<String>,
        technologies: Vec<String>,
    }

    let mut buckets: BTreeMap<DropType, Bucket> = BTreeMap::new();

    for result in results {
        let artifact = &result.artifact;
        let language = artifact.language();
        let raw_path = artifact
            .metadata_str("path")
            .map_or_else(|| artifact.task.id.to_string(), str::to_string);
        let kind = classify(&raw_path, &artifact.content);
        let path = match kind {
            DropType::Codebase | DropType::Documentation => {
                unified::rehome(&raw_path, &artifact.content, &language)
            }
            _ => raw_path,
        };

        let bucket = buckets.entry(kind).or_insert_with(|| Bucket {
            all_passed: true,
            ..Bucket::default()
        });
        bucket.files.insert(path, artifact.content.clone());
        bucket.tasks.push(artifact.task.id.clone());
        bucket.scores.push(result.overall_score);
        bucket.security_scores.push(
            result
                .component_scores
                .get("security")
                .copied()
                .unwrap_or(100),
        );
        bucket.all_passed &= result.passed;
        for dep in dependencies_in(&artifact.content, &language) {
            if !bucket.dependencies.contains(&dep) {
                bucket.dependencies.push(dep);
            }
        }
        for tech in technologies_in(&artifact.content, &language) {
            if !bucket.technologies.contains(&tech) {
                bucket.technologies.push(tech);
            }
        }
    }

    let mut drops = Vec::with_capacity(buckets.len());
    for (kind, bucket) in buckets {
        let file_count = bucket.files.len();
        let total_lines = bucket
            .files
            .values()
            .map(|c| c.lines().count())
            .sum::<usize>();
        let mean = |scores: &[u8]| -> u8 {
            if scores.is_empty() {
                0
            } else {
                (scores.iter().map(|s| u32::from(*s)).sum::<u32>() / scores.len() as u32) as u8
            }
        };
        let hitl_required = match kind.hitl_threshold() {
            None => true,
            Some(threshold) => file_count > threshold,
        };

        let mut drop = QuantumDrop::new(kind, format!("{kind} deliverables"));
        drop.description = format!(
            "{file_count} {kind} file(s) extracted from {} completed task(s)",
            bucket.tasks.len()
        );
        drop.structure = unified::structure_of(bucket.files.keys());
        drop.metadata = DropMetadata {
            file_count,
            total_lines,
            quality_score: mean(&bucket.scores),
            security_score: mean(&bucket.security_scores),
            validation_passed: bucket.all_passed,
            hitl_required,
            dependencies: bucket.dependencies,
            technologies: bucket.technologies,
        };
        drop.status = if hitl_required {
            DropStatus::Pending
        } else {
            DropStatus::Ready
        };
        drop.files = bucket.files;
        drop.tasks = bucket.tasks;
        drops.push(drop);
    }
    drops
}
