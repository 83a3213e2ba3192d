//! No-op sandbox.
//!
//! The container runner is an external collaborator. This adapter stands in
//! wherever one is not wired: it "executes" nothing and returns an empty
//! successful report, so the rest of the pipeline exercises the same code
//! paths it would with a real runner.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::error::OrchestratorError;
use crate::domain::ports::sandbox::{ExecutionReport, Sandbox};

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSandbox;

#[async_trait]
impl Sandbox for NullSandbox {
    async fn execute(
        &self,
        _language: &str,
        content: &str,
        _deadline: Duration,
    ) -> Result<ExecutionReport, OrchestratorError> {
        Ok(ExecutionReport {
            exit_code: 0,
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 0,
            peak_cpu_percent: 0.0,
            peak_memory_bytes: content.len() as u64,
        })
    }
}
