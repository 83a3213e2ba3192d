//! LLM client port.
//!
//! The transport itself (HTTP, CLI, mock) lives behind this trait; workers,
//! the validator's critique pass, and the refinement loop all go through it
//! with deadlines supplied by configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub prompt: String,
    /// Provider/model override; falls back to the client's configured model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            model: None,
            max_tokens: 4096,
            temperature: 0.2,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Completion output plus usage accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Transport and provider failures.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm call timed out after {0}s")]
    Timeout(u64),

    #[error("llm rate limited: {0}")]
    RateLimited(String),

    #[error("llm transport failure: {0}")]
    Transport(String),

    #[error("llm returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("llm not configured: {0}")]
    NotConfigured(String),
}

impl LlmError {
    /// Timeouts, rate limits and transport failures are worth retrying;
    /// malformed responses and missing configuration are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited(_) | Self::Transport(_)
        )
    }
}

/// Port trait for LLM backends. Implementations must be `Send + Sync` for
/// concurrent use across tokio tasks.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Backend identifier used in logs and agent utilization accounting.
    fn client_id(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}
