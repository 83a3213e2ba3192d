//! Scripted LLM client for tests and `serve --mock-llm` runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::ports::llm_client::{
    CompletionRequest, CompletionResponse, LlmClient, LlmError,
};

/// Returns queued responses in order, then falls back to echoing a canned
/// string. Errors can be queued to exercise failure paths.
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: String,
    calls: AtomicU64,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: "// generated placeholder\n".to_string(),
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    pub async fn push_response(&self, content: impl Into<String>) {
        self.responses.lock().await.push_back(Ok(content.into()));
    }

    pub async fn push_error(&self, err: LlmError) {
        self.responses.lock().await.push_back(Err(err));
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn client_id(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.responses.lock().await.pop_front();
        let content = match scripted {
            Some(Ok(content)) => content,
            Some(Err(err)) => return Err(err),
            None => self.fallback.clone(),
        };
        Ok(CompletionResponse {
            content,
            model: request.model.unwrap_or_else(|| "mock".to_string()),
            input_tokens: request.prompt.len() as u64 / 4,
            output_tokens: 64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_fallback() {
        let client = MockLlmClient::new().with_fallback("default");
        client.push_response("first").await;

        let a = client.complete(CompletionRequest::new("p")).await.unwrap();
        assert_eq!(a.content, "first");

        let b = client.complete(CompletionRequest::new("p")).await.unwrap();
        assert_eq!(b.content, "default");
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_scripted_error() {
        let client = MockLlmClient::new();
        client.push_error(LlmError::Timeout(30)).await;
        let err = client.complete(CompletionRequest::new("p")).await;
        assert!(matches!(err, Err(LlmError::Timeout(30))));
    }
}
