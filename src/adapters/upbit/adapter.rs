//! Upbit `CoinService` implementation

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::config::UpbitConfig;
use super::types::{UpbitCandle, UpbitMarket};
use crate::adapters::errors::{ServiceError, ServiceResult};
use crate::adapters::shared::retry_with_backoff;
use crate::adapters::traits::CoinService;
use crate::core::types::{Coin, CoinId, Trades};

/// Wait suggested to callers after a 429 (Upbit limits per second)
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(1);

pub struct UpbitService {
    config: UpbitConfig,
    client: reqwest::Client,
}

impl UpbitService {
    pub fn new(config: UpbitConfig) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        info!(
            phase = "init",
            base_url = %config.base_url,
            timeout_s = config.request_timeout_secs,
            max_attempts = config.retry.max_attempts,
            "Upbit client configured"
        );
        Ok(Self { config, client })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> ServiceResult<T> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ServiceError::TooManyRequests {
                retry_after: RATE_LIMIT_BACKOFF,
            });
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body)
            .map_err(|e| ServiceError::InvalidResponse(format!("{} from {}", e, url)))
    }

    async fn fetch_markets(&self) -> ServiceResult<Vec<UpbitMarket>> {
        self.get_json(
            &self.config.markets_url(),
            &[("is_details", "true".to_string())],
        )
        .await
    }

    async fn fetch_day_candles(&self, market: &str) -> ServiceResult<Vec<UpbitCandle>> {
        self.get_json(
            &self.config.candles_url(),
            &[
                ("market", market.to_string()),
                ("count", self.config.candle_count.to_string()),
            ],
        )
        .await
    }
}

#[async_trait]
impl CoinService for UpbitService {
    async fn list_coins(&self) -> ServiceResult<Vec<Coin>> {
        let now = Utc::now();
        let markets = retry_with_backoff(&self.config.retry, "list_coins", || self.fetch_markets()).await?;

        let coins: Vec<Coin> = markets
            .iter()
            .filter(|m| m.market.starts_with(&self.config.market_prefix))
            .map(|m| m.to_coin(now))
            .collect();

        debug!(total = markets.len(), kept = coins.len(), "Fetched market listing");
        Ok(coins)
    }

    async fn list_trades(&self, id: &CoinId) -> ServiceResult<Trades> {
        let now = Utc::now();
        let candles = retry_with_backoff(&self.config.retry, "list_trades", || {
            self.fetch_day_candles(id.as_str())
        })
        .await?;

        if candles.is_empty() {
            return Err(ServiceError::InvalidResponse(format!("no candles for {}", id)));
        }

        let items = candles
            .iter()
            .map(UpbitCandle::to_trade)
            .collect::<ServiceResult<Vec<_>>>()?;

        Ok(Trades::new(id.clone(), now, items))
    }
}
