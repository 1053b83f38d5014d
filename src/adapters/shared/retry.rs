//! Retry with exponential backoff
//!
//! Generic helper for remote calls. Retryable errors (rate limiting,
//! timeouts, 5xx) are retried with exponential backoff plus jitter, capped
//! at `max_delay_ms`; anything else is returned at once.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::errors::{ServiceError, ServiceResult};

/// Configuration for retry attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Initial delay in milliseconds (doubles each attempt)
    pub initial_delay_ms: u64,
    /// Maximum delay cap in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            initial_delay_ms: 1000,
            max_delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    /// Delay before the retry following failed attempt number `attempt` (0-based)
    fn backoff(&self, attempt: u32) -> Duration {
        // Jitter spreads concurrent refresh jobs hitting the same rate limit
        let jitter = rand::random::<u64>() % 200;
        let exp = self
            .initial_delay_ms
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX));
        Duration::from_millis(exp.min(self.max_delay_ms) + jitter)
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out
///
/// # Example
/// ```ignore
/// let coins = retry_with_backoff(&config, "list_coins", || async {
///     self.fetch_markets().await
/// })
/// .await?;
/// ```
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut op: F,
) -> ServiceResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ServiceResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        attempt += 1;
        if attempt >= max_attempts {
            return Err(ServiceError::RetriesExhausted {
                attempts: max_attempts,
                last: Box::new(err),
            });
        }

        let mut delay = config.backoff(attempt - 1);
        if let ServiceError::TooManyRequests { retry_after } = &err {
            delay = delay.max(*retry_after);
        }

        tracing::warn!(
            operation,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retryable failure, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}
