//! Packaging engine.
//!
//! Consumes `intent.completed` and seals the intent's output into a capsule
//! plus categorised quantum drops, exporting a `.qlcapsule` zip archive.
//! Intent text and validation results are accumulated from the stream while
//! the intent runs; artifacts are ephemeral everywhere else.

pub mod capsule_builder;
pub mod drops;
pub mod export;
pub mod reports;
pub mod unified;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::error::OrchestratorError;
use crate::domain::models::drop::QuantumDrop;
use crate::domain::models::event::{EventEnvelope, EventKind, IntentCompleted};
use crate::domain::models::intent::{Intent, IntentId};
use crate::domain::models::task::TaskId;
use crate::domain::models::validation::ValidationResult;
use crate::domain::ports::clock::Clock;
use crate::domain::ports::event_bus::{EventBus, EventHandler};

use super::metrics::PipelineMetrics;
use capsule_builder::CapsuleBuilder;

/// Consumer group and event source name of the packaging engine.
pub const SOURCE: &str = "qlp-packaging";

/// Accumulated per-intent stream state.
#[derive(Default)]
struct Ledger {
    intent: Option<Intent>,
    /// Last validation result per task id; re-validations overwrite.
    results: HashMap<TaskId, ValidationResult>,
}

pub struct PackagingEngine {
    bus: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    metrics: Arc<PipelineMetrics>,
    output_dir: PathBuf,
    ledgers: Mutex<HashMap<IntentId, Ledger>>,
    /// Capsule id per packaged intent; duplicate `intent.completed` events
    /// are detected here and skipped.
    built: Mutex<HashMap<IntentId, String>>,
    /// Drops per packaged intent, kept for the delivery surface.
    drops: Mutex<HashMap<IntentId, Vec<QuantumDrop>>>,
}

impl PackagingEngine {
    pub fn new(
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        metrics: Arc<PipelineMetrics>,
        output_dir: PathBuf,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            clock,
            metrics,
            output_dir,
            ledgers: Mutex::new(HashMap::new()),
            built: Mutex::new(HashMap::new()),
            drops: Mutex::new(HashMap::new()),
        })
    }

    pub async fn register(self: &Arc<Self>) -> Result<(), OrchestratorError> {
        self.bus
            .subscribe(
                SOURCE,
                &[
                    EventKind::IntentReceived,
                    EventKind::ArtifactValidated,
                    EventKind::IntentCompleted,
                ],
                Arc::new(PackagingHandler(self.clone())),
            )
            .await
    }

    async fn record_intent(&self, intent: Intent) {
        let mut ledgers = self.ledgers.lock().await;
        let intent_id = intent.id.clone();
        ledgers.entry(intent_id).or_default().intent = Some(intent);
    }

    async fn record_result(&self, result: ValidationResult) {
        let intent_id = result.artifact.task.intent_id.clone();
        let task_id = result.artifact.task.id.clone();
        let mut ledgers = self.ledgers.lock().await;
        ledgers
            .entry(intent_id)
            .or_default()
            .results
            .insert(task_id, result);
    }

    /// Build and export the capsule for a completed intent.
    pub async fn handle_intent_completed(
        &self,
        completed: IntentCompleted,
    ) -> Result<(), OrchestratorError> {
        // The guard is held across the build so a duplicate completion
        // event racing in from another partition cannot double-package.
        let mut built = self.built.lock().await;
        if let Some(capsule_id) = built.get(&completed.intent_id) {
            debug!(
                intent_id = %completed.intent_id,
                capsule_id = %capsule_id,
                "duplicate intent.completed; capsule already built"
            );
            return Ok(());
        }

        let ledger = self
            .ledgers
            .lock()
            .await
            .remove(&completed.intent_id)
            .unwrap_or_default();

        let intent = ledger.intent.unwrap_or_else(|| {
            // The intent event predates this consumer or was lost; package
            // what we have under a reconstructed shell.
            warn!(intent_id = %completed.intent_id, "packaging without intent record");
            Intent {
                id: completed.intent_id.clone(),
                user_input: String::new(),
                tasks: Vec::new(),
                status: completed.status,
                created_at: self.clock.now(),
                completed_at: None,
            }
        });

        let mut results: Vec<ValidationResult> = ledger.results.into_values().collect();
        results.sort_by(|a, b| a.artifact.task.id.cmp(&b.artifact.task.id));

        let builder = CapsuleBuilder::new(self.clock.clone());
        let (capsule, drops) = builder.build(&intent, completed.status, results);

        let path = export::export_capsule(&self.output_dir, &capsule, self.clock.as_ref())?;
        info!(
            intent_id = %completed.intent_id,
            capsule_id = %capsule.metadata.capsule_id,
            archive = %path.display(),
            drops = drops.len(),
            "capsule exported"
        );

        self.metrics.capsules_built.fetch_add(1, Ordering::Relaxed);
        built.insert(completed.intent_id.clone(), capsule.metadata.capsule_id.clone());
        drop(built);
        self.drops.lock().await.insert(completed.intent_id, drops);
        Ok(())
    }

    /// Capsule id for an already-packaged intent, if any.
    pub async fn capsule_id_for(&self, intent_id: &IntentId) -> Option<String> {
        self.built.lock().await.get(intent_id).cloned()
    }

    /// Drops produced for an already-packaged intent.
    pub async fn drops_for(&self, intent_id: &IntentId) -> Vec<QuantumDrop> {
        self.drops
            .lock()
            .await
            .get(intent_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Bus-facing adapter.
struct PackagingHandler(Arc<PackagingEngine>);

#[async_trait]
impl EventHandler for PackagingHandler {
    fn name(&self) -> &'static str {
        "packaging-engine"
    }

    async fn handle(&self, event: EventEnvelope) -> Result<(), OrchestratorError> {
        match event.kind {
            EventKind::IntentReceived => {
                self.0.record_intent(event.decode()?).await;
                Ok(())
            }
            EventKind::ArtifactValidated => {
                self.0.record_result(event.decode()?).await;
                Ok(())
            }
            EventKind::IntentCompleted => {
                self.0.handle_intent_completed(event.decode()?).await
            }
            other => {
                debug!(kind = %other, "packaging ignoring unexpected kind");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::domain::models::artifact::Artifact;
    use crate::domain::models::intent::IntentStatus;
    use crate::domain::models::task::{Task, TaskKind};
    use crate::domain::ports::clock::FixedClock;

    struct NullBus;

    #[async_trait]
    impl EventBus for NullBus {
        async fn publish(&self, _event: EventEnvelope) -> Result<(), OrchestratorError> {
            Ok(())
        }
        async fn subscribe(
            &self,
            _group: &str,
            _kinds: &[EventKind],
            _handler: Arc<dyn EventHandler>,
        ) -> Result<(), OrchestratorError> {
            Ok(())
        }
        async fn shutdown(&self) {}
    }

    fn engine(dir: PathBuf) -> Arc<PackagingEngine> {
        let clock = FixedClock(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap());
        PackagingEngine::new(
            Arc::new(NullBus),
            Arc::new(clock),
            Arc::new(PipelineMetrics::new()),
            dir,
        )
    }

    fn passed_result(intent_id: &IntentId, task_id: &str) -> ValidationResult {
        let task = Task::new(intent_id.clone(), TaskKind::Codegen, "gen").with_id(task_id);
        let artifact = Artifact::new(task, "package main\n\nfunc main() {}\n");
        ValidationResult {
            artifact,
            passed: true,
            overall_score: 90,
            component_scores: Default::default(),
            issues: vec![],
            security_findings: vec![],
            validated_at: Utc::now(),
            validation_time_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_duplicate_completion_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path().to_path_buf());
        let intent_id = IntentId::from("i1");

        engine
            .record_intent(Intent {
                id: intent_id.clone(),
                user_input: "build".to_string(),
                tasks: vec![],
                status: IntentStatus::Processing,
                created_at: Utc::now(),
                completed_at: None,
            })
            .await;
        engine.record_result(passed_result(&intent_id, "a")).await;

        let done = IntentCompleted {
            intent_id: intent_id.clone(),
            status: IntentStatus::Completed,
        };
        engine.handle_intent_completed(done.clone()).await.unwrap();
        let first = engine.capsule_id_for(&intent_id).await.unwrap();

        engine.handle_intent_completed(done).await.unwrap();
        assert_eq!(engine.capsule_id_for(&intent_id).await.unwrap(), first);
        assert_eq!(engine.metrics.capsules_built.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_packaging_without_intent_record_still_exports() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine(tmp.path().to_path_buf());
        let intent_id = IntentId::from("orphan");

        engine.record_result(passed_result(&intent_id, "a")).await;
        engine
            .handle_intent_completed(IntentCompleted {
                intent_id: intent_id.clone(),
                status: IntentStatus::Completed,
            })
            .await
            .unwrap();

        assert!(engine.capsule_id_for(&intent_id).await.is_some());
        let archives: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(archives.len(), 1);
    }
}
