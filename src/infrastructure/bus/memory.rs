//! In-process partitioned event broker.
//!
//! Implements the broker delivery contract without a broker product: a
//! single logical topic split into fixed partitions, per-partition FIFO,
//! named consumer groups with committed offsets, and at-least-once
//! redelivery of anything a handler fails or panics on. Offset commits
//! happen only after the handler acknowledges a matching message.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::domain::error::{ErrorKind, OrchestratorError};
use crate::domain::models::event::{EventEnvelope, EventKind};
use crate::domain::ports::event_bus::{EventBus, EventHandler};
use crate::services::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct MemoryBusConfig {
    pub partitions: usize,
    /// Pause before redelivering an uncommitted message.
    pub redelivery_delay: Duration,
    /// Drain budget for in-flight handlers at shutdown.
    pub shutdown_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for MemoryBusConfig {
    fn default() -> Self {
        Self {
            partitions: 8,
            redelivery_delay: Duration::from_millis(250),
            shutdown_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// One append-only partition log.
struct Partition {
    log: RwLock<Vec<EventEnvelope>>,
}

/// Committed offsets of one consumer group, one per partition.
struct GroupState {
    offsets: Vec<AtomicUsize>,
}

pub struct MemoryBus {
    partitions: Vec<Arc<Partition>>,
    groups: Mutex<HashMap<String, Arc<GroupState>>>,
    consumers: Mutex<Vec<JoinHandle<()>>>,
    appended: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    config: MemoryBusConfig,
}

impl MemoryBus {
    pub fn new(config: MemoryBusConfig) -> Self {
        let partitions = (0..config.partitions.max(1))
            .map(|_| {
                Arc::new(Partition {
                    log: RwLock::new(Vec::new()),
                })
            })
            .collect();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            partitions,
            groups: Mutex::new(HashMap::new()),
            consumers: Mutex::new(Vec::new()),
            appended: Arc::new(Notify::new()),
            shutdown_tx,
            config,
        }
    }

    fn partition_for(&self, event: &EventEnvelope) -> usize {
        let mut hasher = DefaultHasher::new();
        event.id.hash(&mut hasher);
        (hasher.finish() as usize) % self.partitions.len()
    }

    /// Total events appended across all partitions. Test visibility.
    pub async fn depth(&self) -> usize {
        let mut total = 0;
        for p in &self.partitions {
            total += p.log.read().await.len();
        }
        total
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, event: EventEnvelope) -> Result<(), OrchestratorError> {
        if *self.shutdown_tx.borrow() {
            return Err(OrchestratorError::ShuttingDown);
        }
        let idx = self.partition_for(&event);
        debug!(kind = %event.kind, event_id = %event.id, partition = idx, "publish");
        self.partitions[idx].log.write().await.push(event);
        self.appended.notify_waiters();
        Ok(())
    }

    async fn subscribe(
        &self,
        group: &str,
        kinds: &[EventKind],
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), OrchestratorError> {
        let state = {
            let mut groups = self.groups.lock().await;
            if groups.contains_key(group) {
                return Err(OrchestratorError::DuplicateGroup(group.to_string()));
            }
            let state = Arc::new(GroupState {
                offsets: (0..self.partitions.len()).map(|_| AtomicUsize::new(0)).collect(),
            });
            groups.insert(group.to_string(), state.clone());
            state
        };

        let mut consumers = self.consumers.lock().await;
        for (idx, partition) in self.partitions.iter().enumerate() {
            let worker = ConsumerLoop {
                group: group.to_string(),
                kinds: kinds.to_vec(),
                handler: handler.clone(),
                partition: partition.clone(),
                partition_index: idx,
                state: state.clone(),
                appended: self.appended.clone(),
                shutdown: self.shutdown_tx.subscribe(),
                redelivery_delay: self.config.redelivery_delay,
                retry: self.config.retry.clone(),
            };
            consumers.push(tokio::spawn(worker.run()));
        }
        Ok(())
    }

    async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.appended.notify_waiters();

        let handles: Vec<JoinHandle<()>> = self.consumers.lock().await.drain(..).collect();
        if tokio::time::timeout(self.config.shutdown_timeout, join_all(handles))
            .await
            .is_err()
        {
            warn!("event bus shutdown timed out; abandoning in-flight handlers");
        }
    }
}

/// One long-lived consumer over one (group, partition) pair: a single
/// suspension point per iteration and a cancellation check between messages.
struct ConsumerLoop {
    group: String,
    kinds: Vec<EventKind>,
    handler: Arc<dyn EventHandler>,
    partition: Arc<Partition>,
    partition_index: usize,
    state: Arc<GroupState>,
    appended: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
    redelivery_delay: Duration,
    retry: RetryPolicy,
}

impl ConsumerLoop {
    async fn run(mut self) {
        let appended = self.appended.clone();
        loop {
            if *self.shutdown.borrow() {
                return;
            }

            let offset = self.state.offsets[self.partition_index].load(Ordering::Acquire);
            let next = self.partition.log.read().await.get(offset).cloned();

            let Some(event) = next else {
                // Park until a publish or shutdown wakes us. The sleep arm
                // covers notifications that land between the log read and
                // the notified() registration.
                tokio::select! {
                    () = appended.notified() => {}
                    () = tokio::time::sleep(Duration::from_millis(50)) => {}
                    _ = self.shutdown.changed() => {}
                }
                continue;
            };

            if !self.kinds.contains(&event.kind) {
                // Acknowledge non-matching kinds to avoid head-of-line blocking.
                self.commit(offset);
                continue;
            }

            match self.deliver(event).await {
                Delivery::Commit => self.commit(offset),
                Delivery::Redeliver => {
                    tokio::select! {
                        () = tokio::time::sleep(self.redelivery_delay) => {}
                        _ = self.shutdown.changed() => return,
                    }
                }
                Delivery::Stop => return,
            }
        }
    }

    fn commit(&self, offset: usize) {
        self.state.offsets[self.partition_index].store(offset + 1, Ordering::Release);
    }

    /// Run the handler once, retrying transient failures in place, and map
    /// the outcome onto the commit decision.
    async fn deliver(&self, event: EventEnvelope) -> Delivery {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let handler = self.handler.clone();
            let ev = event.clone();
            // Spawned so a handler panic is contained to the join error.
            let joined = tokio::spawn(async move { handler.handle(ev).await }).await;

            let err = match joined {
                Ok(Ok(())) => return Delivery::Commit,
                Ok(Err(err)) => err,
                Err(join_err) => {
                    error!(
                        group = %self.group,
                        handler = self.handler.name(),
                        event_id = %event.id,
                        error = %join_err,
                        "handler panicked; leaving message uncommitted"
                    );
                    return Delivery::Redeliver;
                }
            };

            match err.kind() {
                ErrorKind::Transient => {
                    if attempt >= self.retry.max_attempts {
                        warn!(
                            group = %self.group,
                            handler = self.handler.name(),
                            event_id = %event.id,
                            attempts = attempt,
                            error = %err,
                            "transient failure exhausted retry budget; will redeliver"
                        );
                        return Delivery::Redeliver;
                    }
                    let pause = self.retry.backoff_for(attempt);
                    debug!(
                        group = %self.group,
                        event_id = %event.id,
                        attempt,
                        pause_ms = pause.as_millis() as u64,
                        "transient handler failure; retrying in place"
                    );
                    tokio::time::sleep(pause).await;
                }
                ErrorKind::Domain => {
                    warn!(
                        group = %self.group,
                        handler = self.handler.name(),
                        event_id = %event.id,
                        error = %err,
                        "domain failure; acknowledging"
                    );
                    return Delivery::Commit;
                }
                ErrorKind::Poison => {
                    warn!(
                        group = %self.group,
                        handler = self.handler.name(),
                        event_id = %event.id,
                        error = %err,
                        "poisonous message; acknowledging and dropping"
                    );
                    return Delivery::Commit;
                }
                ErrorKind::Fatal => {
                    error!(
                        group = %self.group,
                        handler = self.handler.name(),
                        event_id = %event.id,
                        error = %err,
                        "fatal handler failure; stopping consumer"
                    );
                    return Delivery::Stop;
                }
            }
        }
    }
}

enum Delivery {
    Commit,
    Redeliver,
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    use crate::domain::models::intent::{Intent, IntentId};

    struct Recorder {
        seen: Mutex<Vec<EventKind>>,
        fail_first: AtomicU32,
        failure: fn() -> OrchestratorError,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail_first: AtomicU32::new(0),
                failure: || OrchestratorError::Store("boom".into()),
            })
        }

        fn failing(times: u32, failure: fn() -> OrchestratorError) -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                fail_first: AtomicU32::new(times),
                failure,
            })
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn handle(&self, event: EventEnvelope) -> Result<(), OrchestratorError> {
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err((self.failure)());
            }
            self.seen.lock().await.push(event.kind);
            Ok(())
        }
    }

    fn bus() -> MemoryBus {
        MemoryBus::new(MemoryBusConfig {
            redelivery_delay: Duration::from_millis(10),
            shutdown_timeout: Duration::from_secs(1),
            retry: RetryPolicy {
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                max_attempts: 3,
            },
            ..MemoryBusConfig::default()
        })
    }

    fn intent_event() -> EventEnvelope {
        EventEnvelope::new(
            EventKind::IntentReceived,
            "test",
            &Intent::new("hello"),
        )
        .unwrap()
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_delivers_matching_events() {
        let bus = bus();
        let recorder = Recorder::new();
        bus.subscribe("g1", &[EventKind::IntentReceived], recorder.clone())
            .await
            .unwrap();

        bus.publish(intent_event()).await.unwrap();

        wait_for(|| recorder.seen.try_lock().map(|s| s.len() == 1).unwrap_or(false)).await;
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_non_matching_kinds_are_acknowledged() {
        let bus = bus();
        let recorder = Recorder::new();
        bus.subscribe("g1", &[EventKind::TaskReady], recorder.clone())
            .await
            .unwrap();

        // Not subscribed to intent.received: must be committed, not delivered.
        bus.publish(intent_event()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(recorder.seen.lock().await.is_empty());
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_delivers() {
        let bus = bus();
        let recorder = Recorder::failing(2, || OrchestratorError::Store("flaky".into()));
        bus.subscribe("g1", &[EventKind::IntentReceived], recorder.clone())
            .await
            .unwrap();

        bus.publish(intent_event()).await.unwrap();

        wait_for(|| recorder.seen.try_lock().map(|s| s.len() == 1).unwrap_or(false)).await;
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_redelivery_after_retry_budget() {
        let bus = bus();
        // Fails more times than the in-place budget (3); redelivery must
        // eventually get it through.
        let recorder = Recorder::failing(4, || OrchestratorError::Store("down".into()));
        bus.subscribe("g1", &[EventKind::IntentReceived], recorder.clone())
            .await
            .unwrap();

        bus.publish(intent_event()).await.unwrap();

        wait_for(|| recorder.seen.try_lock().map(|s| s.len() == 1).unwrap_or(false)).await;
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_domain_failure_is_acknowledged_once() {
        let bus = bus();
        let recorder = Recorder::failing(1, || {
            OrchestratorError::UnknownIntent(IntentId::from("ghost"))
        });
        bus.subscribe("g1", &[EventKind::IntentReceived], recorder.clone())
            .await
            .unwrap();

        bus.publish(intent_event()).await.unwrap();
        bus.publish(intent_event()).await.unwrap();

        // First event consumed the failure; both must end committed and the
        // second delivered exactly once.
        wait_for(|| recorder.seen.try_lock().map(|s| s.len() == 1).unwrap_or(false)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(recorder.seen.lock().await.len(), 1);
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_group_rejected() {
        let bus = bus();
        let recorder = Recorder::new();
        bus.subscribe("g1", &[EventKind::IntentReceived], recorder.clone())
            .await
            .unwrap();
        let err = bus
            .subscribe("g1", &[EventKind::IntentReceived], recorder)
            .await;
        assert!(matches!(err, Err(OrchestratorError::DuplicateGroup(_))));
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_rejected() {
        let bus = bus();
        bus.shutdown().await;
        let err = bus.publish(intent_event()).await;
        assert!(matches!(err, Err(OrchestratorError::ShuttingDown)));
    }

    struct Panicker;

    #[async_trait]
    impl EventHandler for Panicker {
        fn name(&self) -> &'static str {
            "panicker"
        }

        async fn handle(&self, _event: EventEnvelope) -> Result<(), OrchestratorError> {
            panic!("handler exploded");
        }
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let bus = bus();
        bus.subscribe("g1", &[EventKind::IntentReceived], Arc::new(Panicker))
            .await
            .unwrap();
        bus.publish(intent_event()).await.unwrap();
        // The panic must not take down the bus; shutdown still works.
        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.shutdown().await;
    }
}
