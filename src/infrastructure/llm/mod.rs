//! LLM client adapters.

pub mod http;
pub mod mock;

pub use http::{HttpLlmClient, HttpLlmConfig};
pub use mock::MockLlmClient;
