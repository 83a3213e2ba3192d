//! Ensemble fan-out/fan-in rewrite.
//!
//! Every task flagged `ensemble` is replaced by one child per configured
//! provider plus a synthetic judgement task that depends on all children.
//! Downstream dependency lists are rewritten so edges that pointed at the
//! ensemble task now point at its judgement, preserving the wiring while
//! inserting the fan-in barrier.

use std::collections::BTreeMap;

use tracing::warn;

use crate::domain::models::task::{Task, TaskId, TaskKind, TaskStatus};

/// Rewrite `tasks` against the provider set. The input order is preserved
/// where possible: children and judgement take the ensemble task's place.
pub fn rewrite(tasks: Vec<Task>, providers: &[String]) -> Vec<Task> {
    // First pass: map every eliminated ensemble id to its judgement id so
    // dependency rewriting sees all replacements, including those between
    // two ensemble tasks.
    let replacements: BTreeMap<TaskId, TaskId> = tasks
        .iter()
        .filter(|t| t.ensemble && !providers.is_empty())
        .map(|t| (t.id.clone(), t.id.judgement()))
        .collect();

    let remap = |deps: &[TaskId]| -> Vec<TaskId> {
        deps.iter()
            .map(|d| replacements.get(d).cloned().unwrap_or_else(|| d.clone()))
            .collect()
    };

    let mut out = Vec::with_capacity(tasks.len());
    for task in tasks {
        if !task.ensemble || providers.is_empty() {
            if task.ensemble {
                warn!(task_id = %task.id, "empty provider set; running ensemble task singly");
            }
            let mut plain = task;
            plain.ensemble = false;
            plain.dependencies = remap(&plain.dependencies);
            out.push(plain);
            continue;
        }

        let inherited = remap(&task.dependencies);
        let mut child_ids = Vec::with_capacity(providers.len());
        for provider in providers {
            let child_id = task.id.ensemble_child(provider);
            child_ids.push(child_id.clone());
            out.push(Task {
                id: child_id,
                intent_id: task.intent_id.clone(),
                kind: task.kind,
                description: format!("[{provider}] {}", task.description),
                dependencies: inherited.clone(),
                priority: task.priority,
                ensemble: false,
                model: Some(provider.clone()),
                status: TaskStatus::Pending,
            });
        }

        out.push(Task {
            id: task.id.judgement(),
            intent_id: task.intent_id.clone(),
            kind: TaskKind::Judgement,
            description: format!(
                "Select the best of {} candidate outputs for: {}",
                providers.len(),
                task.description
            ),
            dependencies: child_ids,
            priority: task.priority,
            ensemble: false,
            model: None,
            status: TaskStatus::Pending,
        });
    }

    debug_assert!(out.iter().all(|t| !t.ensemble));
    out
}
