//! Runtime configuration model.
//!
//! Values merge from programmatic defaults, an optional `qlp.yaml`, and the
//! environment; see `infrastructure::config::ConfigLoader` for precedence
//! and for the flat variables (`KAFKA_BROKERS`, `REDIS_ADDR`, ...) the
//! deployment contract mandates.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Validation depth selector (`QLP_VALIDATION_LEVEL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationLevel {
    /// Heuristic-only scoring, no LLM critique.
    Fast,
    /// Full component scoring including LLM critique.
    Full,
}

impl Default for ValidationLevel {
    fn default() -> Self {
        Self::Full
    }
}

impl ValidationLevel {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fast" => Some(Self::Fast),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    pub level: String,
    /// json | pretty
    pub format: String,
    /// stdout | path to a log directory
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
            output: "stdout".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub level: ValidationLevel,
    /// Refinement budget per artifact.
    pub max_refinement_cycles: u32,
    /// Pattern matches below this confidence are discarded.
    pub confidence_threshold: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            level: ValidationLevel::default(),
            max_refinement_cycles: 3,
            confidence_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub llm_secs: u64,
    pub sandbox_secs: u64,
    pub health_check_secs: u64,
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_secs: 30,
            sandbox_secs: 300,
            health_check_secs: 5,
            shutdown_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
            max_attempts: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// TTL for persisted DAGs, seconds.
    pub dag_ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { dag_ttl_secs: 86_400 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusConfig {
    pub partitions: usize,
    /// Delay before an uncommitted message is retried.
    pub redelivery_delay_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            partitions: 8,
            redelivery_delay_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub requests_per_minute: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            requests_per_minute: 60,
        }
    }
}

/// Full runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Broker bootstrap list; absence is a fatal startup error.
    pub kafka_brokers: Vec<String>,
    pub redis_addr: String,
    pub output_dir: PathBuf,
    pub port: u16,
    /// Ensemble provider set used by the fan-out rewrite.
    pub providers: Vec<String>,
    pub logging: LoggingConfig,
    pub validation: ValidationConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub store: StoreConfig,
    pub bus: BusConfig,
    pub llm: LlmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kafka_brokers: Vec::new(),
            redis_addr: "127.0.0.1:6379".to_string(),
            output_dir: PathBuf::from("./capsules"),
            port: 8080,
            providers: vec![
                "openai".to_string(),
                "anthropic".to_string(),
                "groq".to_string(),
            ],
            logging: LoggingConfig::default(),
            validation: ValidationConfig::default(),
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            store: StoreConfig::default(),
            bus: BusConfig::default(),
            llm: LlmConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_contract() {
        let cfg = Config::default();
        assert_eq!(cfg.validation.max_refinement_cycles, 3);
        assert!((cfg.validation.confidence_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(cfg.timeouts.llm_secs, 30);
        assert_eq!(cfg.timeouts.sandbox_secs, 300);
        assert_eq!(cfg.timeouts.health_check_secs, 5);
        assert_eq!(cfg.retry.initial_backoff_ms, 100);
        assert_eq!(cfg.retry.max_backoff_ms, 5_000);
        assert_eq!(cfg.retry.max_attempts, 6);
        assert_eq!(cfg.store.dag_ttl_secs, 86_400);
        assert_eq!(cfg.providers.len(), 3);
    }

    #[test]
    fn test_validation_level_parsing() {
        assert_eq!(ValidationLevel::from_str("fast"), Some(ValidationLevel::Fast));
        assert_eq!(ValidationLevel::from_str("FULL"), Some(ValidationLevel::Full));
        assert_eq!(ValidationLevel::from_str("turbo"), None);
    }
}
