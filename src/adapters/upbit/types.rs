//! Upbit REST payloads
//!
//! Prices arrive as JSON numbers. They are captured as `serde_json::Number`
//! (arbitrary precision), so the exact text the exchange sent is kept.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::adapters::errors::{ServiceError, ServiceResult};
use crate::core::types::{Coin, CoinId, Price, Trade};

const CANDLE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// =============================================================================
// Market listing
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UpbitMarket {
    pub market: String,
    #[serde(default)]
    pub market_event: Option<MarketEvent>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MarketEvent {
    #[serde(default)]
    pub warning: bool,
    #[serde(default)]
    pub caution: Option<MarketCaution>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MarketCaution {
    #[serde(rename = "PRICE_FLUCTUATIONS", default)]
    pub price_fluctuations: bool,
    #[serde(rename = "TRADING_VOLUME_SOARING", default)]
    pub trading_volume_soaring: bool,
    #[serde(rename = "DEPOSIT_AMOUNT_SOARING", default)]
    pub deposit_amount_soaring: bool,
    #[serde(rename = "GLOBAL_PRICE_DIFFERENCES", default)]
    pub global_price_differences: bool,
    #[serde(rename = "CONCENTRATION_OF_SMALL_ACCOUNTS", default)]
    pub concentration_of_small_accounts: bool,
}

impl MarketCaution {
    pub fn any(&self) -> bool {
        self.price_fluctuations
            || self.trading_volume_soaring
            || self.deposit_amount_soaring
            || self.global_price_differences
            || self.concentration_of_small_accounts
    }
}

impl UpbitMarket {
    pub fn is_hazardous(&self) -> bool {
        self.market_event.as_ref().map_or(false, |event| {
            event.warning || event.caution.as_ref().map_or(false, MarketCaution::any)
        })
    }

    pub fn to_coin(&self, now: DateTime<Utc>) -> Coin {
        Coin::new(CoinId::new(self.market.clone()), self.is_hazardous(), now)
    }
}

// =============================================================================
// Daily candles
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct UpbitCandle {
    pub market: String,
    pub candle_date_time_utc: String,
    pub opening_price: serde_json::Number,
    pub high_price: serde_json::Number,
    pub low_price: serde_json::Number,
    pub trade_price: serde_json::Number,
}

impl UpbitCandle {
    pub fn to_trade(&self) -> ServiceResult<Trade> {
        let naive = NaiveDateTime::parse_from_str(&self.candle_date_time_utc, CANDLE_TIME_FORMAT)
            .map_err(|e| {
                ServiceError::InvalidResponse(format!(
                    "bad candle_date_time_utc '{}': {}",
                    self.candle_date_time_utc, e
                ))
            })?;

        Ok(Trade {
            date: naive.and_utc(),
            last_price: exact_price(&self.trade_price)?,
            opening_price: exact_price(&self.opening_price)?,
            max_price: exact_price(&self.high_price)?,
            min_price: exact_price(&self.low_price)?,
        })
    }
}

/// Keep the number's text; exponent notation is expanded to plain decimal
fn exact_price(number: &serde_json::Number) -> ServiceResult<Price> {
    let text = number.to_string();
    if !text.contains(['e', 'E']) {
        return Ok(Price::new(text));
    }
    Decimal::from_scientific(&text)
        .or_else(|_| Decimal::from_str(&text))
        .map(|d| Price::new(d.normalize().to_string()))
        .map_err(|e| ServiceError::InvalidResponse(format!("bad price '{}': {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKETS_JSON: &str = r#"[
        {"market":"KRW-BTC","korean_name":"비트코인","english_name":"Bitcoin",
         "market_event":{"warning":false,"caution":{"PRICE_FLUCTUATIONS":false,"TRADING_VOLUME_SOARING":false,"DEPOSIT_AMOUNT_SOARING":false,"GLOBAL_PRICE_DIFFERENCES":false,"CONCENTRATION_OF_SMALL_ACCOUNTS":false}}},
        {"market":"KRW-XRP","korean_name":"리플","english_name":"Ripple",
         "market_event":{"warning":false,"caution":{"PRICE_FLUCTUATIONS":true}}},
        {"market":"KRW-DOGE","korean_name":"도지","english_name":"Dogecoin",
         "market_event":{"warning":true}},
        {"market":"BTC-ETH","korean_name":"이더리움","english_name":"Ethereum"}
    ]"#;

    #[test]
    fn test_market_hazard_flags() {
        let markets: Vec<UpbitMarket> = serde_json::from_str(MARKETS_JSON).unwrap();
        let flags: Vec<(&str, bool)> = markets
            .iter()
            .map(|m| (m.market.as_str(), m.is_hazardous()))
            .collect();
        assert_eq!(
            flags,
            vec![
                ("KRW-BTC", false),
                ("KRW-XRP", true),
                ("KRW-DOGE", true),
                ("BTC-ETH", false),
            ]
        );
    }

    #[test]
    fn test_candle_keeps_exact_price_text() {
        let candle: UpbitCandle = serde_json::from_str(
            r#"{"market":"KRW-BTC","candle_date_time_utc":"2024-03-01T00:00:00",
                "opening_price":91234000.0,"high_price":92000000,"low_price":0.00001234,
                "trade_price":150000.5}"#,
        )
        .unwrap();
        let trade = candle.to_trade().unwrap();
        assert_eq!(trade.last_price.as_str(), "150000.5");
        assert_eq!(trade.opening_price.as_str(), "91234000.0");
        assert_eq!(trade.max_price.as_str(), "92000000");
        assert_eq!(trade.min_price.as_str(), "0.00001234");
        assert_eq!(trade.date.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn test_candle_scientific_price_expanded() {
        let candle: UpbitCandle = serde_json::from_str(
            r#"{"market":"KRW-SHIB","candle_date_time_utc":"2024-03-01T00:00:00",
                "opening_price":1.5e-5,"high_price":1,"low_price":1,"trade_price":1}"#,
        )
        .unwrap();
        let trade = candle.to_trade().unwrap();
        assert_eq!(trade.opening_price.as_str(), "0.000015");
    }

    #[test]
    fn test_candle_bad_date_is_invalid_response() {
        let candle: UpbitCandle = serde_json::from_str(
            r#"{"market":"KRW-BTC","candle_date_time_utc":"yesterday",
                "opening_price":1,"high_price":1,"low_price":1,"trade_price":1}"#,
        )
        .unwrap();
        assert!(matches!(candle.to_trade(), Err(ServiceError::InvalidResponse(_))));
    }
}
