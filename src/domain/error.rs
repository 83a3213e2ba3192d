//! Pipeline error types.
//!
//! Every error carries a classification that the event-bus boundary uses to
//! decide between retry, acknowledge-and-log, and process exit.

use thiserror::Error;

use super::models::graph::GraphError;
use super::models::intent::IntentId;
use super::models::task::TaskId;
use super::ports::llm_client::LlmError;

/// How a failure should be treated at the consumer boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Retried with exponential backoff; the message stays uncommitted.
    Transient,
    /// Surfaced as an explicit negative result on the stream; not retried.
    Domain,
    /// Acknowledged and dropped after logging; never blocks the queue.
    Poison,
    /// Startup misconfiguration or unrecoverable state; process exits.
    Fatal,
}

/// Unified error type for the intent execution pipeline.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("event broker unavailable: {0}")]
    BrokerUnavailable(String),

    #[error("event bus is shutting down")]
    ShuttingDown,

    #[error("consumer group {0} is already registered")]
    DuplicateGroup(String),

    #[error("state store failure: {0}")]
    Store(String),

    #[error("state store timed out: {0}")]
    StoreTimeout(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("unknown intent {0}")]
    UnknownIntent(IntentId),

    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("unsupported task type: {0}")]
    UnsupportedTaskType(String),

    #[error("malformed event payload: {0}")]
    MalformedPayload(String),

    #[error("payload codec failure: {0}")]
    Codec(#[from] serde_json::Error),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("sandbox failure: {0}")]
    Sandbox(String),

    #[error("validation internals failed: {0}")]
    Validation(String),

    #[error("capsule packaging failed: {0}")]
    Packaging(String),

    #[error("archive failure: {0}")]
    Archive(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl OrchestratorError {
    /// Classification used by the bus boundary (§ error handling design).
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BrokerUnavailable(_)
            | Self::StoreTimeout(_)
            | Self::Store(_)
            | Self::Io(_) => ErrorKind::Transient,

            Self::Llm(e) => {
                if e.is_transient() {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Domain
                }
            }

            Self::Graph(_)
            | Self::UnknownIntent(_)
            | Self::UnknownTask(_)
            | Self::UnsupportedTaskType(_)
            | Self::Validation(_)
            | Self::Sandbox(_)
            | Self::Packaging(_)
            | Self::Archive(_) => ErrorKind::Domain,

            Self::MalformedPayload(_) | Self::Codec(_) => ErrorKind::Poison,

            Self::ShuttingDown | Self::DuplicateGroup(_) | Self::Config(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let err = OrchestratorError::BrokerUnavailable("connection refused".into());
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(err.is_transient());
    }

    #[test]
    fn test_poison_classification() {
        let err = OrchestratorError::MalformedPayload("truncated json".into());
        assert_eq!(err.kind(), ErrorKind::Poison);
        assert!(!err.is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        let err = OrchestratorError::Config("KAFKA_BROKERS is not set".into());
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }
}
