//! Capsule assembly.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::capsule::{
    capsule_id, CapsuleManifest, CapsuleMetadata, QLCapsule,
};
use crate::domain::models::drop::QuantumDrop;
use crate::domain::models::intent::{Intent, IntentStatus};
use crate::domain::models::task::{Task, TaskStatus};
use crate::domain::models::validation::ValidationResult;
use crate::domain::ports::clock::Clock;

use super::{drops, reports, unified};

pub struct CapsuleBuilder {
    clock: Arc<dyn Clock>,
}

impl CapsuleBuilder {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Seal the intent's collected results into a capsule and its drops.
    pub fn build(
        &self,
        intent: &Intent,
        status: IntentStatus,
        results: Vec<ValidationResult>,
    ) -> (QLCapsule, Vec<QuantumDrop>) {
        let completed_at = self.clock.now();
        let duration = (completed_at - intent.created_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        let successful = results.iter().filter(|r| r.passed).count();
        let failed = results.len() - successful;

        let overall_score = if results.is_empty() {
            0
        } else {
            (results
                .iter()
                .map(|r| u32::from(r.overall_score))
                .sum::<u32>()
                / results.len() as u32) as u8
        };

        let execution_summary = reports::execution_summary(&results, duration);
        let security_report = reports::security_report(&results);
        let quality_report = reports::quality_report(&results);

        let tasks: Vec<Task> = results
            .iter()
            .map(|r| {
                let mut task = r.artifact.task.clone();
                task.status = if r.passed {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Failed
                };
                task
            })
            .collect();

        let generated_drops = drops::build_drops(&results);
        let unified_project = unified::unified_project(&generated_drops);

        let mut tags: Vec<String> = execution_summary
            .tasks_by_type
            .keys()
            .cloned()
            .collect();
        if status == IntentStatus::Failed {
            tags.push("failed".to_string());
        }

        let metadata = CapsuleMetadata {
            capsule_id: capsule_id(&intent.id, &intent.user_input, completed_at),
            intent_id: intent.id.clone(),
            intent_text: intent.user_input.clone(),
            created_at: intent.created_at,
            completed_at,
            duration_secs: duration.as_secs(),
            total_tasks: results.len(),
            successful_tasks: successful,
            failed_tasks: failed,
            overall_score,
            quality_score: quality_report.average_quality_score.round() as u8,
            tags,
        };

        let manifest = self.manifest(&generated_drops, &tasks);

        let capsule = QLCapsule {
            metadata,
            tasks,
            artifacts: results.iter().map(|r| r.artifact.clone()).collect(),
            validation_results: results,
            execution_summary,
            security_report,
            quality_report,
            manifest,
            unified_project: if unified_project.is_empty() {
                None
            } else {
                Some(unified_project)
            },
        };
        (capsule, generated_drops)
    }

    fn manifest(&self, drops: &[QuantumDrop], tasks: &[Task]) -> CapsuleManifest {
        let mut file_structure = BTreeMap::new();
        file_structure.insert("manifest.json".to_string(), "this manifest".to_string());
        file_structure.insert("metadata.json".to_string(), "capsule metadata".to_string());
        for task in tasks {
            file_structure.insert(
                format!("tasks/{}.json", task.id),
                format!("{} task record", task.kind),
            );
        }
        for report in [
            "execution_summary",
            "security_report",
            "quality_report",
            "validation_results",
        ] {
            file_structure.insert(format!("reports/{report}.json"), format!("{report} report"));
        }
        for drop in drops {
            for path in drop.files.keys() {
                file_structure.insert(format!("project/{path}"), format!("{} file", drop.kind));
            }
        }
        file_structure.insert("README.md".to_string(), "capsule overview".to_string());

        let runtime_requirements = drops
            .iter()
            .flat_map(|d| d.metadata.technologies.iter().cloned())
            .collect::<std::collections::BTreeSet<String>>()
            .into_iter()
            .collect();

        CapsuleManifest {
            schema_version: "1.0".to_string(),
            file_structure,
            runtime_requirements,
        }
    }
}
