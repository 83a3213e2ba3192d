//! Transient-failure retry policy.
//!
//! One policy drives both the consumer boundary (in-place retries before a
//! message is left for redelivery) and ad-hoc call sites via the `backoff`
//! crate wrapper.

use std::time::Duration;

use backoff::ExponentialBackoffBuilder;

use crate::domain::error::OrchestratorError;
use crate::domain::models::config::RetryConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            max_attempts: 6,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            initial_backoff: Duration::from_millis(cfg.initial_backoff_ms),
            max_backoff: Duration::from_millis(cfg.max_backoff_ms),
            max_attempts: cfg.max_attempts,
        }
    }
}

impl RetryPolicy {
    /// Deterministic doubling backoff for attempt `n` (1-based), capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1).min(16));
        let millis = (self.initial_backoff.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(millis).min(self.max_backoff)
    }

    fn to_backoff(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Retry `op` on transient errors per the policy; everything else is
/// returned immediately. The attempt count includes the first call.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, OrchestratorError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, OrchestratorError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0u32;
    backoff::future::retry(policy.to_backoff(), || {
        attempts += 1;
        let fut = op();
        let give_up = attempts >= max_attempts;
        async move {
            fut.await.map_err(|err| {
                if err.is_transient() && !give_up {
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })
        }
    })
    .await
}
