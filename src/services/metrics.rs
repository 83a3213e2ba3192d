//! Pipeline counters surfaced on `/metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Process-wide counters. Cheap to share; every field is monotonic.
pub struct PipelineMetrics {
    started_at: Instant,
    pub intents_admitted: AtomicU64,
    pub intents_completed: AtomicU64,
    pub tasks_dispatched: AtomicU64,
    pub artifacts_created: AtomicU64,
    pub validations_passed: AtomicU64,
    pub validations_failed: AtomicU64,
    pub refinement_cycles: AtomicU64,
    pub capsules_built: AtomicU64,
    pub stale_events: AtomicU64,
}

/// Point-in-time view for the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub intents_admitted: u64,
    pub intents_completed: u64,
    pub tasks_dispatched: u64,
    pub artifacts_created: u64,
    pub validations_passed: u64,
    pub validations_failed: u64,
    pub refinement_cycles: u64,
    pub capsules_built: u64,
    pub stale_events: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            intents_admitted: AtomicU64::new(0),
            intents_completed: AtomicU64::new(0),
            tasks_dispatched: AtomicU64::new(0),
            artifacts_created: AtomicU64::new(0),
            validations_passed: AtomicU64::new(0),
            validations_failed: AtomicU64::new(0),
            refinement_cycles: AtomicU64::new(0),
            capsules_built: AtomicU64::new(0),
            stale_events: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs(),
            intents_admitted: self.intents_admitted.load(Ordering::Relaxed),
            intents_completed: self.intents_completed.load(Ordering::Relaxed),
            tasks_dispatched: self.tasks_dispatched.load(Ordering::Relaxed),
            artifacts_created: self.artifacts_created.load(Ordering::Relaxed),
            validations_passed: self.validations_passed.load(Ordering::Relaxed),
            validations_failed: self.validations_failed.load(Ordering::Relaxed),
            refinement_cycles: self.refinement_cycles.load(Ordering::Relaxed),
            capsules_built: self.capsules_built.load(Ordering::Relaxed),
            stale_events: self.stale_events.load(Ordering::Relaxed),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = PipelineMetrics::new();
        metrics.tasks_dispatched.fetch_add(3, Ordering::Relaxed);
        metrics.validations_passed.fetch_add(1, Ordering::Relaxed);

        let snap = metrics.snapshot();
        assert_eq!(snap.tasks_dispatched, 3);
        assert_eq!(snap.validations_passed, 1);
        assert_eq!(snap.capsules_built, 0);
    }
}
