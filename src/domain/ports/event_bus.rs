//! Event bus port.
//!
//! Delivery contract: at-least-once; per-partition FIFO; no ordering across
//! partitions. Offsets commit only after the handler returns `Ok` for a
//! message whose kind matches the subscription; non-matching and undecodable
//! messages are acknowledged so they never block the group.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::error::OrchestratorError;
use crate::domain::models::event::{EventEnvelope, EventKind};

/// A consumer-side handler invoked for every matching event.
///
/// Returning `Err` with a transient classification leaves the message
/// uncommitted for redelivery; domain and poison errors are acknowledged.
/// Panics are recovered at the bus boundary and treated like transient
/// failures.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable handler name used in logs.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: EventEnvelope) -> Result<(), OrchestratorError>;
}

/// Publish/subscribe over the single logical `qlp-events` topic.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Append an event; the partition is derived from the event id.
    async fn publish(&self, event: EventEnvelope) -> Result<(), OrchestratorError>;

    /// Register `handler` under a named consumer group for the given kinds.
    ///
    /// One subscription per group: a second registration under the same name
    /// is an error, which keeps offset ownership unambiguous.
    async fn subscribe(
        &self,
        group: &str,
        kinds: &[EventKind],
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), OrchestratorError>;

    /// Stop all consumer loops, letting in-flight handlers finish within the
    /// configured shutdown budget.
    async fn shutdown(&self);
}
