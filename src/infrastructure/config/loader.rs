//! Configuration loader with hierarchical merging.
//!
//! Precedence (lowest to highest):
//! 1. Programmatic defaults (Serialized)
//! 2. `qlp.yaml` in the working directory (optional)
//! 3. `QLP_`-prefixed environment variables (`QLP_BUS__PARTITIONS=16`)
//! 4. The flat deployment variables the platform contract mandates:
//!    `KAFKA_BROKERS` (CSV, required), `REDIS_ADDR`, `OUTPUT_DIR`, `PORT`,
//!    `QLP_LOG_LEVEL`/`QLP_LOG_FORMAT`/`QLP_LOG_OUTPUT`,
//!    `QLP_VALIDATION_LEVEL`.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::{Config, ValidationLevel};

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("KAFKA_BROKERS is not set; the pipeline cannot start without a broker list")]
    MissingBrokers,

    #[error("Invalid PORT: {0}")]
    InvalidPort(String),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid validation level: {0}. Must be one of: fast, full")]
    InvalidValidationLevel(String),

    #[error("Invalid refinement budget: {0}. Cannot be 0")]
    InvalidRefinementBudget(u32),

    #[error("Invalid confidence threshold: {0}. Must be within [0, 1]")]
    InvalidConfidenceThreshold(f64),

    #[error("Invalid partition count: {0}. Must be at least 1")]
    InvalidPartitions(usize),

    #[error("Invalid retry attempts: {0}. Cannot be 0")]
    InvalidMaxAttempts(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid provider set: at least one ensemble provider is required")]
    EmptyProviders,
}

/// Configuration loader.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load() -> Result<Config> {
        let mut config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("qlp.yaml"))
            .merge(Env::prefixed("QLP_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::apply_platform_env(&mut config)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring the
    /// environment on top.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let mut config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("QLP_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::apply_platform_env(&mut config)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// The flat, contract-mandated variables override everything else.
    fn apply_platform_env(config: &mut Config) -> Result<(), ConfigError> {
        if let Ok(brokers) = std::env::var("KAFKA_BROKERS") {
            config.kafka_brokers = brokers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Ok(addr) = std::env::var("REDIS_ADDR") {
            config.redis_addr = addr;
        }
        if let Ok(dir) = std::env::var("OUTPUT_DIR") {
            config.output_dir = dir.into();
        }
        if let Ok(port) = std::env::var("PORT") {
            config.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
        }
        if let Ok(level) = std::env::var("QLP_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("QLP_LOG_FORMAT") {
            config.logging.format = format;
        }
        if let Ok(output) = std::env::var("QLP_LOG_OUTPUT") {
            config.logging.output = output;
        }
        if let Ok(level) = std::env::var("QLP_VALIDATION_LEVEL") {
            config.validation.level = ValidationLevel::from_str(&level)
                .ok_or(ConfigError::InvalidValidationLevel(level))?;
        }
        Ok(())
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        // An empty broker list is the one fatal startup misconfiguration.
        if config.kafka_brokers.is_empty() {
            return Err(ConfigError::MissingBrokers);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.validation.max_refinement_cycles == 0 {
            return Err(ConfigError::InvalidRefinementBudget(
                config.validation.max_refinement_cycles,
            ));
        }

        let threshold = config.validation.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidConfidenceThreshold(threshold));
        }

        if config.bus.partitions == 0 {
            return Err(ConfigError::InvalidPartitions(config.bus.partitions));
        }

        if config.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(config.retry.max_attempts));
        }

        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        if config.providers.is_empty() {
            return Err(ConfigError::EmptyProviders);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            kafka_brokers: vec!["localhost:9092".to_string()],
            ..Config::default()
        }
    }

    #[test]
    fn test_missing_brokers_is_fatal() {
        let config = Config::default();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::MissingBrokers)
        ));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(ConfigLoader::validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = valid_config();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_zero_refinement_budget_rejected() {
        let mut config = valid_config();
        config.validation.max_refinement_cycles = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidRefinementBudget(0))
        ));
    }

    #[test]
    fn test_backoff_ordering_enforced() {
        let mut config = valid_config();
        config.retry.initial_backoff_ms = 10_000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(_, _))
        ));
    }

    #[test]
    fn test_platform_env_overrides() {
        temp_env::with_vars(
            [
                ("KAFKA_BROKERS", Some("b1:9092, b2:9092")),
                ("REDIS_ADDR", Some("redis:6379")),
                ("PORT", Some("9999")),
                ("QLP_VALIDATION_LEVEL", Some("fast")),
            ],
            || {
                let config = ConfigLoader::load().unwrap();
                assert_eq!(config.kafka_brokers, vec!["b1:9092", "b2:9092"]);
                assert_eq!(config.redis_addr, "redis:6379");
                assert_eq!(config.port, 9999);
                assert_eq!(config.validation.level, ValidationLevel::Fast);
            },
        );
    }

    #[test]
    fn test_load_without_brokers_fails() {
        temp_env::with_vars([("KAFKA_BROKERS", None::<&str>)], || {
            assert!(ConfigLoader::load().is_err());
        });
    }
}
