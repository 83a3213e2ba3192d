//! Event envelope and protocol names.
//!
//! Wire format is JSON: `{id, type, timestamp, source, payload}` with the
//! payload carried as base64-encoded JSON bytes. Everything that crosses the
//! bus goes through this envelope.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::OrchestratorError;

use super::intent::{IntentId, IntentStatus};

/// Protocol event names on the `qlp-events` topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "intent.received")]
    IntentReceived,
    #[serde(rename = "task.ready")]
    TaskReady,
    #[serde(rename = "artifact.created")]
    ArtifactCreated,
    #[serde(rename = "artifact.validated")]
    ArtifactValidated,
    #[serde(rename = "intent.completed")]
    IntentCompleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntentReceived => "intent.received",
            Self::TaskReady => "task.ready",
            Self::ArtifactCreated => "artifact.created",
            Self::ArtifactValidated => "artifact.validated",
            Self::IntentCompleted => "intent.completed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload of `intent.completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentCompleted {
    pub intent_id: IntentId,
    pub status: IntentStatus,
}

mod payload_b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

/// Typed envelope for every message on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    /// Logical producer name, e.g. `qlp-orchestrator`.
    pub source: String,
    #[serde(with = "payload_b64")]
    pub payload: Vec<u8>,
}

impl EventEnvelope {
    /// Wrap a typed payload. The payload is serialized eagerly so publish
    /// failures surface at the call site rather than inside the broker.
    pub fn new<T: Serialize>(
        kind: EventKind,
        source: &str,
        payload: &T,
    ) -> Result<Self, OrchestratorError> {
        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            source: source.to_string(),
            payload: serde_json::to_vec(payload)?,
        })
    }

    /// Decode the payload into its expected type.
    ///
    /// A decode failure is a poisonous message: the consumer acknowledges it
    /// and moves on.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, OrchestratorError> {
        serde_json::from_slice(&self.payload).map_err(|e| {
            OrchestratorError::MalformedPayload(format!(
                "{} event {}: {e}",
                self.kind, self.id
            ))
        })
    }
}
