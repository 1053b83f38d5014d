//! Upbit configuration

use serde::{Deserialize, Serialize};

use crate::adapters::shared::RetryConfig;
use crate::error::AppError;

// =============================================================================
// Constants
// =============================================================================

/// Production REST endpoint
const DEFAULT_BASE_URL: &str = "https://api.upbit.com";

/// Only markets quoted in this currency are cached
const DEFAULT_MARKET_PREFIX: &str = "KRW-";

/// Days of history per refresh
const DEFAULT_CANDLE_COUNT: u32 = 20;

/// The candles endpoint rejects larger counts
const MAX_CANDLE_COUNT: u32 = 200;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpbitConfig {
    pub base_url: String,
    pub market_prefix: String,
    pub candle_count: u32,
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for UpbitConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            market_prefix: DEFAULT_MARKET_PREFIX.to_string(),
            candle_count: DEFAULT_CANDLE_COUNT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            retry: RetryConfig::default(),
        }
    }
}

impl UpbitConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.base_url.trim().is_empty() {
            return Err(AppError::Config("service.base_url cannot be empty".to_string()));
        }

        if self.candle_count < 1 || self.candle_count > MAX_CANDLE_COUNT {
            return Err(AppError::Config(format!(
                "service.candle_count must be 1-{}, got {}",
                MAX_CANDLE_COUNT, self.candle_count
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "service.request_timeout_secs must be > 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(AppError::Config(
                "service.retry.max_attempts must be >= 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn markets_url(&self) -> String {
        format!("{}/v1/market/all", self.base_url.trim_end_matches('/'))
    }

    pub fn candles_url(&self) -> String {
        format!("{}/v1/candles/days", self.base_url.trim_end_matches('/'))
    }
}
