//! Worker runtime.
//!
//! Consumes `task.ready`, builds a type-specific prompt, calls the LLM with
//! the configured deadline, optionally executes the output in the sandbox,
//! and emits exactly one `artifact.created` per attempt. Attempts on the
//! same task id produce distinct artifact ids; re-deliveries are deduped by
//! task id while an attempt is in flight or already succeeded.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::domain::error::OrchestratorError;
use crate::domain::models::artifact::Artifact;
use crate::domain::models::event::{EventEnvelope, EventKind};
use crate::domain::models::task::{Task, TaskId, TaskKind};
use crate::domain::ports::event_bus::{EventBus, EventHandler};
use crate::domain::ports::llm_client::{CompletionRequest, LlmClient};
use crate::domain::ports::sandbox::Sandbox;

use super::metrics::PipelineMetrics;

/// Consumer group and event source name of the worker runtime.
pub const SOURCE: &str = "qlp-agents";

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub llm_deadline: Duration,
    pub sandbox_deadline: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            llm_deadline: Duration::from_secs(30),
            sandbox_deadline: Duration::from_secs(300),
        }
    }
}

pub struct WorkerRuntime {
    bus: Arc<dyn EventBus>,
    llm: Arc<dyn LlmClient>,
    sandbox: Arc<dyn Sandbox>,
    metrics: Arc<PipelineMetrics>,
    config: WorkerConfig,
    /// Task ids with an attempt in flight or completed. Entries for failed
    /// attempts are removed so redelivery can retry.
    seen: tokio::sync::Mutex<HashSet<TaskId>>,
    /// Outputs of completed tasks, consulted by judgement prompts.
    outputs: tokio::sync::Mutex<HashMap<TaskId, String>>,
}

impl WorkerRuntime {
    pub fn new(
        bus: Arc<dyn EventBus>,
        llm: Arc<dyn LlmClient>,
        sandbox: Arc<dyn Sandbox>,
        metrics: Arc<PipelineMetrics>,
        config: WorkerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            bus,
            llm,
            sandbox,
            metrics,
            config,
            seen: tokio::sync::Mutex::new(HashSet::new()),
            outputs: tokio::sync::Mutex::new(HashMap::new()),
        })
    }

    pub async fn register(self: &Arc<Self>) -> Result<(), OrchestratorError> {
        self.bus
            .subscribe(
                SOURCE,
                &[EventKind::TaskReady],
                Arc::new(WorkerHandler(self.clone())),
            )
            .await
    }

    pub async fn handle_task_ready(&self, task: Task) -> Result<(), OrchestratorError> {
        {
            let mut seen = self.seen.lock().await;
            if !seen.insert(task.id.clone()) {
                debug!(task_id = %task.id, "duplicate dispatch deduped");
                return Ok(());
            }
        }

        match self.attempt(&task).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // Failed attempts release the dedup slot so a redelivered
                // task.ready can retry.
                self.seen.lock().await.remove(&task.id);
                Err(err)
            }
        }
    }

    async fn attempt(&self, task: &Task) -> Result<(), OrchestratorError> {
        let prompt = self.build_prompt(task).await;
        info!(task_id = %task.id, kind = %task.kind, "executing task");

        let mut request = CompletionRequest::new(prompt)
            .with_system(system_prompt(task.kind));
        if let Some(model) = &task.model {
            request = request.with_model(model.clone());
        }

        let completion = tokio::time::timeout(self.config.llm_deadline, self.llm.complete(request))
            .await
            .map_err(|_| {
                OrchestratorError::Llm(crate::domain::ports::llm_client::LlmError::Timeout(
                    self.config.llm_deadline.as_secs(),
                ))
            })??;

        let content = completion.content;
        let language = crate::domain::models::artifact::sniff_language(&content);

        let mut artifact = Artifact::new(task.clone(), content)
            .with_metadata("language", json!(language))
            .with_metadata("provider", json!(completion.model))
            .with_metadata("path", json!(default_path(task, language)))
            .with_metadata("input_tokens", json!(completion.input_tokens))
            .with_metadata("output_tokens", json!(completion.output_tokens));

        if runs_in_sandbox(task.kind) {
            match self
                .sandbox
                .execute(language, &artifact.content, self.config.sandbox_deadline)
                .await
            {
                Ok(report) => {
                    artifact = artifact.with_metadata("sandbox", json!(report));
                }
                Err(err) => {
                    // A broken sandbox is not a broken artifact; note it and
                    // let validation judge the content on its own.
                    warn!(task_id = %task.id, error = %err, "sandbox execution failed");
                    artifact =
                        artifact.with_metadata("sandbox_error", json!(err.to_string()));
                }
            }
        }

        self.outputs
            .lock()
            .await
            .insert(task.id.clone(), artifact.content.clone());

        let event = EventEnvelope::new(EventKind::ArtifactCreated, SOURCE, &artifact)?;
        self.bus.publish(event).await?;
        self.metrics.artifacts_created.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn build_prompt(&self, task: &Task) -> String {
        if task.kind == TaskKind::Judgement {
            return self.judgement_prompt(task).await;
        }
        task_prompt(task)
    }

    async fn judgement_prompt(&self, task: &Task) -> String {
        let outputs = self.outputs.lock().await;
        let mut candidates = String::new();
        for (idx, dep) in task.dependencies.iter().enumerate() {
            let body = outputs
                .get(dep)
                .map_or("(output unavailable)", String::as_str);
            candidates.push_str(&format!(
                "## Candidate {} ({})\n```\n{}\n```\n\n",
                idx + 1,
                dep,
                body
            ));
        }
        format!(
            r"# Judgement

{description}

Compare the candidate outputs below and return the single best one,
verbatim and complete. Do not merge candidates. Do not add commentary.

{candidates}",
            description = task.description,
            candidates = candidates,
        )
    }
}

fn runs_in_sandbox(kind: TaskKind) -> bool {
    matches!(kind, TaskKind::Codegen | TaskKind::Test | TaskKind::Judgement)
}

fn system_prompt(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Codegen | TaskKind::Judgement => {
            "You are a senior software engineer. Return only the file content, no prose."
        }
        TaskKind::Infra => {
            "You are an infrastructure engineer. Return only the manifest or plan content."
        }
        TaskKind::Test => {
            "You are a test engineer. Return only the test file content, no prose."
        }
        TaskKind::Doc => "You are a technical writer. Return only the document content.",
        TaskKind::Analyze => {
            "You are a code analyst. Return a structured analysis report in markdown."
        }
    }
}

fn task_prompt(task: &Task) -> String {
    match task.kind {
        TaskKind::Codegen => format!(
            r"# Code Generation Task

{}

Produce a single, complete, production-quality source file. Handle errors
explicitly and avoid placeholder logic.",
            task.description
        ),
        TaskKind::Infra => format!(
            r"# Infrastructure Task

{}

Produce a single deployable manifest (Dockerfile, Kubernetes YAML, or
Terraform). Pin versions and avoid privileged defaults.",
            task.description
        ),
        TaskKind::Test => format!(
            r"# Test Authoring Task

{}

Produce a single test file covering the happy path and the failure paths.",
            task.description
        ),
        TaskKind::Doc => format!(
            r"# Documentation Task

{}

Produce a single markdown document. Lead with what the component does.",
            task.description
        ),
        TaskKind::Analyze => format!(
            r"# Analysis Task

{}

Produce an analysis report: findings first, evidence after.",
            task.description
        ),
        TaskKind::Judgement => task.description.clone(),
    }
}

/// Default artifact path when a task does not imply one.
fn default_path(task: &Task, language: &str) -> String {
    let ext = match language {
        "go" => "go",
        "rust" => "rs",
        "python" => "py",
        "javascript" => "js",
        "infra" => "yaml",
        _ => "txt",
    };
    match task.kind {
        TaskKind::Doc => format!("{}.md", task.id),
        TaskKind::Analyze => format!("analysis/{}.md", task.id),
        TaskKind::Test => format!("{}_test.{ext}", task.id),
        TaskKind::Infra => format!("{}.{ext}", task.id),
        _ => format!("{}.{ext}", task.id),
    }
}

/// Bus-facing adapter.
struct WorkerHandler(Arc<WorkerRuntime>);

#[async_trait]
impl EventHandler for WorkerHandler {
    fn name(&self) -> &'static str {
        "worker-runtime"
    }

    async fn handle(&self, event: EventEnvelope) -> Result<(), OrchestratorError> {
        let task: Task = event.decode()?;
        self.0.handle_task_ready(task).await
    }
}
