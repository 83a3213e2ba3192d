//! Shared helpers for pipeline integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use qlp::domain::error::OrchestratorError;
use qlp::domain::models::event::{EventEnvelope, EventKind};
use qlp::domain::models::intent::{Intent, IntentId, IntentStatus};
use qlp::domain::models::task::{Task, TaskId, TaskKind};
use qlp::domain::ports::event_bus::{EventBus, EventHandler};
use qlp::infrastructure::bus::{MemoryBus, MemoryBusConfig};
use qlp::services::retry::RetryPolicy;

/// Bus tuned for fast test turnaround.
pub fn test_bus() -> Arc<MemoryBus> {
    Arc::new(MemoryBus::new(MemoryBusConfig {
        partitions: 4,
        redelivery_delay: Duration::from_millis(10),
        shutdown_timeout: Duration::from_secs(2),
        retry: RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            max_attempts: 3,
        },
    }))
}

/// Observer that records every envelope it sees.
pub struct EventObserver {
    pub events: Mutex<Vec<EventEnvelope>>,
}

impl EventObserver {
    pub async fn attach(bus: &Arc<MemoryBus>) -> Arc<Self> {
        let observer = Arc::new(Self {
            events: Mutex::new(Vec::new()),
        });
        bus.subscribe(
            "test-observer",
            &[
                EventKind::IntentReceived,
                EventKind::TaskReady,
                EventKind::ArtifactCreated,
                EventKind::ArtifactValidated,
                EventKind::IntentCompleted,
            ],
            observer.clone(),
        )
        .await
        .expect("observer subscribes");
        observer
    }

    pub async fn count_of(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    /// Task ids of every `task.ready` seen, in delivery order.
    pub async fn ready_ids(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.kind == EventKind::TaskReady)
            .map(|e| e.decode::<Task>().expect("task decodes").id.0)
            .collect()
    }

    /// Wait until at least one event of `kind` was observed.
    pub async fn wait_for(&self, kind: EventKind) {
        self.wait_for_n(kind, 1).await;
    }

    pub async fn wait_for_n(&self, kind: EventKind, n: usize) {
        for _ in 0..600 {
            if self.count_of(kind).await >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never observed {n} {kind} event(s)");
    }
}

#[async_trait]
impl EventHandler for EventObserver {
    fn name(&self) -> &'static str {
        "event-observer"
    }

    async fn handle(&self, event: EventEnvelope) -> Result<(), OrchestratorError> {
        self.events.lock().await.push(event);
        Ok(())
    }
}

/// Submit an intent through the gateway-facing event.
pub async fn submit(bus: &Arc<MemoryBus>, intent: &Intent) {
    let event =
        EventEnvelope::new(EventKind::IntentReceived, "gateway", intent).expect("intent encodes");
    bus.publish(event).await.expect("publish succeeds");
}

pub fn intent_with_tasks(id: &str, tasks: Vec<Task>) -> Intent {
    Intent {
        id: IntentId::from(id),
        user_input: format!("intent {id}"),
        tasks,
        status: IntentStatus::Pending,
        created_at: chrono::Utc::now(),
        completed_at: None,
    }
}

pub fn task(intent_id: &str, id: &str, deps: &[&str]) -> Task {
    Task::new(IntentId::from(intent_id), TaskKind::Codegen, format!("build {id}"))
        .with_id(id)
        .with_dependencies(deps.iter().map(|d| TaskId::from(*d)).collect())
}
