//! HTTP LLM transport (OpenAI-compatible chat completions).
//!
//! Rate limited in-process with `governor` and bounded by the configured
//! per-call deadline. Transport-level failures map to transient errors so
//! the caller's retry policy applies.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::models::config::LlmConfig;
use crate::domain::ports::llm_client::{
    CompletionRequest, CompletionResponse, LlmClient, LlmError,
};

#[derive(Debug, Clone)]
pub struct HttpLlmConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub requests_per_minute: u32,
    pub timeout: Duration,
}

impl HttpLlmConfig {
    pub fn from_config(llm: &LlmConfig, timeout_secs: u64) -> Self {
        Self {
            endpoint: llm.endpoint.clone(),
            api_key: llm.api_key.clone(),
            model: llm.model.clone(),
            requests_per_minute: llm.requests_per_minute,
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ChatUsage,
    #[serde(default)]
    model: String,
}

pub struct HttpLlmClient {
    client: reqwest::Client,
    config: HttpLlmConfig,
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl HttpLlmClient {
    pub fn new(config: HttpLlmConfig) -> Result<Self, LlmError> {
        if config.api_key.is_empty() {
            return Err(LlmError::NotConfigured(
                "llm.api_key is empty; set QLP_LLM__API_KEY or use --mock-llm".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        let rpm = NonZeroU32::new(config.requests_per_minute.max(1))
            .unwrap_or(NonZeroU32::MIN);
        Ok(Self {
            client,
            limiter: RateLimiter::direct(Quota::per_minute(rpm)),
            config,
        })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    fn client_id(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.limiter.until_ready().await;

        let model = request.model.as_deref().unwrap_or(&self.config.model);
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!(model, endpoint = %self.config.endpoint, "llm request");
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.config.timeout.as_secs())
                } else {
                    LlmError::Transport(e.to_string())
                }
            })?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(LlmError::RateLimited("429 from provider".to_string()));
            }
            status if status.is_server_error() => {
                return Err(LlmError::Transport(format!("provider returned {status}")));
            }
            status if !status.is_success() => {
                let text = response.text().await.unwrap_or_default();
                return Err(LlmError::InvalidResponse(format!("{status}: {text}")));
            }
            _ => {}
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("empty choices".to_string()))?;

        Ok(CompletionResponse {
            content,
            model: if parsed.model.is_empty() {
                model.to_string()
            } else {
                parsed.model
            },
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: parsed.usage.completion_tokens,
        })
    }
}
