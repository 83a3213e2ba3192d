//! Sandbox port.
//!
//! The container runner is an external collaborator; the pipeline only
//! depends on this execution contract and on the report it returns, which
//! feeds sandbox-derived security checks and capsule metrics.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::error::OrchestratorError;

/// Outcome of executing artifact content in isolation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub peak_cpu_percent: f64,
    pub peak_memory_bytes: u64,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes untrusted artifact content with a deadline.
#[async_trait]
pub trait Sandbox: Send + Sync {
    async fn execute(
        &self,
        language: &str,
        content: &str,
        deadline: Duration,
    ) -> Result<ExecutionReport, OrchestratorError>;
}
