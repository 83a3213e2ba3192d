//! QLP — intent execution pipeline.
//!
//! Turns a submitted intent (a request plus a parsed task DAG) into a
//! validated, packaged deliverable:
//! - per-intent task graphs with ensemble fan-out/fan-in rewrites
//! - event-driven coordination with at-least-once consumer groups
//! - weighted validation scoring with a bounded refinement loop
//! - capsule + quantum-drop packaging with a zip export

pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::error::{ErrorKind, OrchestratorError};
pub use domain::models::{
    Artifact, EventEnvelope, EventKind, Intent, IntentId, QLCapsule, QuantumDrop, Task,
    TaskGraph, TaskId, ValidationResult,
};
