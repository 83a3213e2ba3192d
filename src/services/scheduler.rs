//! Orchestrator scheduler core.
//!
//! Consumes `intent.received` and `artifact.validated`; maintains per-intent
//! task graphs in the state store; dispatches ready tasks as `task.ready`;
//! emits `intent.completed` when a graph drains.
//!
//! Progress tracking is deliberately minimal: a task is either present in
//! the graph (pending or in flight) or absent (validated complete). There is
//! no dispatched bit, so a restart may re-emit `task.ready` for work already
//! in flight; workers deduplicate by task id.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::domain::error::OrchestratorError;
use crate::domain::models::event::{EventEnvelope, EventKind, IntentCompleted};
use crate::domain::models::graph::TaskGraph;
use crate::domain::models::intent::{Intent, IntentId, IntentStatus};
use crate::domain::models::task::{Task, TaskId};
use crate::domain::models::validation::ValidationResult;
use crate::domain::ports::dag_store::DagStore;
use crate::domain::ports::event_bus::{EventBus, EventHandler};

use super::ensemble;
use super::metrics::PipelineMetrics;

/// Consumer group and event source name of the orchestrator.
pub const SOURCE: &str = "qlp-orchestrator";

pub struct IntentScheduler {
    bus: Arc<dyn EventBus>,
    store: Arc<dyn DagStore>,
    metrics: Arc<PipelineMetrics>,
    providers: Vec<String>,
    /// Per-intent locks serialize get -> mutate -> set so racing validation
    /// events for one intent observe each other's writes. Entries are
    /// removed when the intent completes.
    intent_locks: Mutex<HashMap<IntentId, Arc<Mutex<()>>>>,
}

impl IntentScheduler {
    pub fn new(
        bus: Arc<dyn EventBus>,
        store: Arc<dyn DagStore>,
        metrics: Arc<PipelineMetrics>,
        providers: Vec<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            store,
            metrics,
            providers,
            intent_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Register the scheduler's consumer group on the bus.
    pub async fn register(self: &Arc<Self>) -> Result<(), OrchestratorError> {
        self.bus
            .subscribe(
                SOURCE,
                &[EventKind::IntentReceived, EventKind::ArtifactValidated],
                Arc::new(SchedulerHandler(self.clone())),
            )
            .await
    }

    async fn lock_for(&self, intent_id: &IntentId) -> Arc<Mutex<()>> {
        let mut locks = self.intent_locks.lock().await;
        locks
            .entry(intent_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_lock(&self, intent_id: &IntentId) {
        self.intent_locks.lock().await.remove(intent_id);
    }

    /// Intent admission: ensemble rewrite, graph build, persist, dispatch.
    pub async fn handle_intent_received(&self, intent: Intent) -> Result<(), OrchestratorError> {
        info!(
            intent_id = %intent.id,
            tasks = intent.tasks.len(),
            status = %IntentStatus::Processing,
            "intent admitted"
        );
        self.metrics.intents_admitted.fetch_add(1, Ordering::Relaxed);

        if intent.tasks.is_empty() {
            // Nothing to schedule: complete immediately, never store.
            self.publish_completed(&intent.id, IntentStatus::Completed).await?;
            return Ok(());
        }

        let tasks = ensemble::rewrite(intent.tasks, &self.providers);

        let mut graph = TaskGraph::new();
        for task in &tasks {
            graph.add_task(task.clone())?;
        }
        for task in &tasks {
            for dep in &task.dependencies {
                graph.add_edge(dep, &task.id)?;
            }
        }

        let lock = self.lock_for(&intent.id).await;
        let _guard = lock.lock().await;
        self.store.set(&intent.id, &graph).await?;
        drop(_guard);

        self.dispatch_ready(&graph).await?;
        Ok(())
    }

    /// Validation feedback: completion on pass, halt on fail.
    pub async fn handle_artifact_validated(
        &self,
        result: ValidationResult,
    ) -> Result<(), OrchestratorError> {
        let task = &result.artifact.task;
        let intent_id = task.intent_id.clone();

        if !result.passed {
            // The branch halts here. A refinement loop-back to the
            // orchestrator is hinted at by the protocol but its event is
            // undefined; the validator owns refinement for now.
            // TODO: publish `refinement.required` once its schema is agreed.
            warn!(
                intent_id = %intent_id,
                task_id = %task.id,
                score = result.overall_score,
                "validation failed; branch halted"
            );
            self.metrics.validations_failed.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        self.metrics.validations_passed.fetch_add(1, Ordering::Relaxed);

        let lock = self.lock_for(&intent_id).await;
        let _guard = lock.lock().await;

        let Some(mut graph) = self.store.get(&intent_id).await? else {
            // Deleted or expired entry: the intent is completed or unknown.
            // Never re-create state from a late event.
            self.metrics.stale_events.fetch_add(1, Ordering::Relaxed);
            warn!(intent_id = %intent_id, task_id = %task.id, "stale validation event; dropping");
            return Ok(());
        };

        // Dependents of the completed task are the only candidates that can
        // become ready; tasks already dispatched stay in flight untouched.
        let dependents: Vec<TaskId> = graph
            .dependents_of(&task.id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let was_present = graph.mark_complete(&task.id);

        if graph.is_empty() {
            // Publish before delete: a failed delete redelivers this event,
            // re-publishes completion (deduped downstream) and retries the
            // delete, instead of losing the completion outright.
            self.publish_completed(&intent_id, IntentStatus::Completed).await?;
            self.store.delete(&intent_id).await?;
            drop(_guard);
            self.release_lock(&intent_id).await;
            return Ok(());
        }

        self.store.set(&intent_id, &graph).await?;
        drop(_guard);

        if was_present {
            let released: Vec<&Task> = dependents
                .iter()
                .filter_map(|id| graph.task(id))
                .filter(|t| {
                    graph
                        .dependencies_of(&t.id)
                        .is_none_or(std::collections::BTreeSet::is_empty)
                })
                .collect();
            self.dispatch(released).await?;
        } else {
            // Redelivered completion: the first delivery may have died after
            // persisting but before dispatching, so resweep the whole ready
            // set. Workers dedupe anything already in flight.
            debug!(intent_id = %intent_id, task_id = %task.id, "redelivered completion; resweeping");
            self.dispatch_ready(&graph).await?;
        }
        Ok(())
    }

    /// Dispatch the full ready set. Used at admission and after a restart;
    /// workers dedupe anything already in flight.
    async fn dispatch_ready(&self, graph: &TaskGraph) -> Result<usize, OrchestratorError> {
        self.dispatch(graph.ready_tasks()).await
    }

    /// Publish one `task.ready` per task, priority-desc then id-asc.
    async fn dispatch(&self, mut tasks: Vec<&Task>) -> Result<usize, OrchestratorError> {
        tasks.sort_by_key(|t| (Reverse(t.priority), t.id.clone()));

        for task in &tasks {
            let mut dispatched = (*task).clone();
            dispatched.status = crate::domain::models::task::TaskStatus::InProgress;
            let event = EventEnvelope::new(EventKind::TaskReady, SOURCE, &dispatched)?;
            self.bus.publish(event).await?;
            self.metrics.tasks_dispatched.fetch_add(1, Ordering::Relaxed);
            debug!(task_id = %task.id, priority = task.priority.as_str(), "task dispatched");
        }
        Ok(tasks.len())
    }

    async fn publish_completed(
        &self,
        intent_id: &IntentId,
        status: IntentStatus,
    ) -> Result<(), OrchestratorError> {
        info!(%intent_id, %status, "intent completed");
        self.metrics.intents_completed.fetch_add(1, Ordering::Relaxed);
        let payload = IntentCompleted {
            intent_id: intent_id.clone(),
            status,
        };
        let event = EventEnvelope::new(EventKind::IntentCompleted, SOURCE, &payload)?;
        self.bus.publish(event).await
    }
}

/// Bus-facing adapter: decodes envelopes and routes them by kind.
struct SchedulerHandler(Arc<IntentScheduler>);

#[async_trait]
impl EventHandler for SchedulerHandler {
    fn name(&self) -> &'static str {
        "intent-scheduler"
    }

    async fn handle(&self, event: EventEnvelope) -> Result<(), OrchestratorError> {
        match event.kind {
            EventKind::IntentReceived => {
                let intent: Intent = event.decode()?;
                self.0.handle_intent_received(intent).await
            }
            EventKind::ArtifactValidated => {
                let result: ValidationResult = event.decode()?;
                self.0.handle_artifact_validated(result).await
            }
            other => {
                debug!(kind = %other, "scheduler ignoring unexpected kind");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;

    use crate::domain::models::artifact::Artifact;
    use crate::domain::models::task::{TaskId, TaskKind, TaskPriority};
    use crate::infrastructure::store::MemoryDagStore;

    /// Collecting bus: records published events instead of delivering them.
    struct CollectingBus {
        events: Mutex<Vec<EventEnvelope>>,
    }

    impl CollectingBus {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        async fn kinds(&self) -> Vec<EventKind> {
            self.events.lock().await.iter().map(|e| e.kind).collect()
        }

        async fn ready_task_ids(&self) -> Vec<String> {
            let events = self.events.lock().await;
            events
                .iter()
                .filter(|e| e.kind == EventKind::TaskReady)
                .map(|e| e.decode::<Task>().unwrap().id.0)
                .collect()
        }
    }

    #[async_trait]
    impl EventBus for CollectingBus {
        async fn publish(&self, event: EventEnvelope) -> Result<(), OrchestratorError> {
            self.events.lock().await.push(event);
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

    fn scheduler(bus: Arc<CollectingBus>) -> (Arc<IntentScheduler>, Arc<MemoryDagStore>) {
        let store = Arc::new(MemoryDagStore::new(Duration::from_secs(60)));
        let scheduler = IntentScheduler::new(
            bus,
            store.clone(),
            Arc::new(PipelineMetrics::new()),
            vec!["p1".to_string(), "p2".to_string(), "p3".to_string()],
        );
        (scheduler, store)
    }

    fn chain_intent() -> Intent {
        let intent_id = IntentId::from("i1");
        let a = Task::new(intent_id.clone(), TaskKind::Codegen, "a").with_id("a");
        let b = Task::new(intent_id.clone(), TaskKind::Codegen, "b")
            .with_id("b")
            .with_dependencies(vec![TaskId::from("a")]);
        let c = Task::new(intent_id.clone(), TaskKind::Codegen, "c")
            .with_id("c")
            .with_dependencies(vec![TaskId::from("b")]);
        Intent {
            id: intent_id,
            user_input: "chain".to_string(),
            tasks: vec![a, b, c],
            status: IntentStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    fn validated(task: Task, passed: bool) -> ValidationResult {
        ValidationResult {
            artifact: Artifact::new(task, "content"),
            passed,
            overall_score: if passed { 90 } else { 40 },
            component_scores: Default::default(),
            issues: vec![],
            security_findings: vec![],
            validated_at: Utc::now(),
            validation_time_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_admission_dispatches_only_roots() {
        let bus = CollectingBus::new();
        let (scheduler, _) = scheduler(bus.clone());

        scheduler.handle_intent_received(chain_intent()).await.unwrap();

        assert_eq!(bus.ready_task_ids().await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_zero_task_intent_completes_immediately() {
        let bus = CollectingBus::new();
        let (scheduler, store) = scheduler(bus.clone());

        let intent = Intent::new("empty");
        let id = intent.id.clone();
        scheduler.handle_intent_received(intent).await.unwrap();

        assert_eq!(bus.kinds().await, vec![EventKind::IntentCompleted]);
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_chain_progresses_and_completes() {
        let bus = CollectingBus::new();
        let (scheduler, store) = scheduler(bus.clone());
        let intent = chain_intent();
        let tasks = intent.tasks.clone();
        let intent_id = intent.id.clone();

        scheduler.handle_intent_received(intent).await.unwrap();
        scheduler
            .handle_artifact_validated(validated(tasks[0].clone(), true))
            .await
            .unwrap();
        scheduler
            .handle_artifact_validated(validated(tasks[1].clone(), true))
            .await
            .unwrap();
        scheduler
            .handle_artifact_validated(validated(tasks[2].clone(), true))
            .await
            .unwrap();

        // Exactly three task.ready events, in chain order.
        assert_eq!(bus.ready_task_ids().await, vec!["a", "b", "c"]);
        let kinds = bus.kinds().await;
        assert_eq!(
            kinds.iter().filter(|k| **k == EventKind::IntentCompleted).count(),
            1
        );
        assert!(store.get(&intent_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_validation_halts_branch() {
        let bus = CollectingBus::new();
        let (scheduler, store) = scheduler(bus.clone());
        let intent = chain_intent();
        let tasks = intent.tasks.clone();
        let intent_id = intent.id.clone();

        scheduler.handle_intent_received(intent).await.unwrap();
        scheduler
            .handle_artifact_validated(validated(tasks[0].clone(), false))
            .await
            .unwrap();

        // No new dispatch, no completion, graph untouched.
        assert_eq!(bus.ready_task_ids().await, vec!["a"]);
        assert!(!bus.kinds().await.contains(&EventKind::IntentCompleted));
        assert_eq!(store.get(&intent_id).await.unwrap().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_stale_event_is_dropped() {
        let bus = CollectingBus::new();
        let (scheduler, _) = scheduler(bus.clone());

        let ghost = Task::new(IntentId::from("ghost"), TaskKind::Codegen, "x").with_id("g");
        scheduler
            .handle_artifact_validated(validated(ghost, true))
            .await
            .unwrap();

        assert!(bus.kinds().await.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_orders_by_priority_then_id() {
        let bus = CollectingBus::new();
        let (scheduler, _) = scheduler(bus.clone());

        let intent_id = IntentId::from("i2");
        let low = Task::new(intent_id.clone(), TaskKind::Doc, "low")
            .with_id("z-low")
            .with_priority(TaskPriority::Low);
        let crit = Task::new(intent_id.clone(), TaskKind::Codegen, "crit")
            .with_id("m-crit")
            .with_priority(TaskPriority::Critical);
        let norm_a = Task::new(intent_id.clone(), TaskKind::Codegen, "na").with_id("a-norm");
        let norm_b = Task::new(intent_id.clone(), TaskKind::Codegen, "nb").with_id("b-norm");

        let intent = Intent {
            id: intent_id,
            user_input: "prio".to_string(),
            tasks: vec![low, norm_b, crit, norm_a],
            status: IntentStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        };
        scheduler.handle_intent_received(intent).await.unwrap();

        assert_eq!(
            bus.ready_task_ids().await,
            vec!["m-crit", "a-norm", "b-norm", "z-low"]
        );
    }

    #[tokio::test]
    async fn test_ensemble_admission_shape() {
        let bus = CollectingBus::new();
        let (scheduler, store) = scheduler(bus.clone());

        let intent_id = IntentId::from("i3");
        let mut a = Task::new(intent_id.clone(), TaskKind::Codegen, "gen").with_id("a");
        a.ensemble = true;
        let b = Task::new(intent_id.clone(), TaskKind::Test, "test")
            .with_id("b")
            .with_dependencies(vec![TaskId::from("a")]);

        let intent = Intent {
            id: intent_id.clone(),
            user_input: "ensemble".to_string(),
            tasks: vec![a, b],
            status: IntentStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        };
        scheduler.handle_intent_received(intent).await.unwrap();

        let graph = store.get(&intent_id).await.unwrap().unwrap();
        assert_eq!(graph.len(), 5);
        for id in ["a-p1", "a-p2", "a-p3", "a-judgement", "b"] {
            assert!(graph.contains(&TaskId::from(id)), "missing {id}");
        }

        // Only the worker children are initially ready.
        let mut ready = bus.ready_task_ids().await;
        ready.sort();
        assert_eq!(ready, vec!["a-p1", "a-p2", "a-p3"]);
    }
}
