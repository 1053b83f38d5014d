//! Domain types shared by every component
//!
//! - `CoinId`: market identifier (e.g. `KRW-BTC`)
//! - `Coin`: cached listing entry with its risk flag
//! - `BannedCoin`: an active or expired ban
//! - `Trades` / `Trade`: daily OHLC history, prices kept as exact decimal text

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A cached coin is stale once it is older than this many seconds
pub const COIN_REFRESH_PERIOD_SECS: i64 = 600;

/// Trade history shorter than this is considered insufficient
pub const ENOUGH_TRADE_COUNT: usize = 20;

// ============================================================================
// CoinId
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoinId(String);

impl CoinId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CoinId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ============================================================================
// Coin
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub id: CoinId,
    /// Caution or warning raised by the listing source
    pub danger: bool,
    pub modified_at: DateTime<Utc>,
}

impl Coin {
    pub fn new(id: impl Into<CoinId>, danger: bool, modified_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            danger,
            modified_at,
        }
    }

    pub fn is_danger(&self) -> bool {
        self.danger
    }

    /// True once `modified_at` plus the refresh period is strictly before `now`
    pub fn is_old(&self, now: DateTime<Utc>) -> bool {
        self.modified_at + Duration::seconds(COIN_REFRESH_PERIOD_SECS) < now
    }

    /// Copy of this coin stamped with a new modification time
    pub fn with_modified_at(&self, now: DateTime<Utc>) -> Self {
        Self {
            modified_at: now,
            ..self.clone()
        }
    }
}

// ============================================================================
// BannedCoin
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannedCoin {
    pub coin_id: CoinId,
    pub banned_at: DateTime<Utc>,
    pub period: Duration,
}

impl BannedCoin {
    pub fn new(coin_id: CoinId, banned_at: DateTime<Utc>, period: Duration) -> Self {
        Self {
            coin_id,
            banned_at,
            period,
        }
    }

    pub fn expired_at(&self) -> DateTime<Utc> {
        self.banned_at + self.period
    }

    /// The ban is active while `now < expired_at()`
    pub fn is_ban_over(&self, now: DateTime<Utc>) -> bool {
        now >= self.expired_at()
    }
}

// ============================================================================
// Price / Trade / Trades
// ============================================================================

/// Decimal price held as its exact textual representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(String);

impl Price {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Exact decimal value
    pub fn value(&self) -> Result<Decimal, AppError> {
        Decimal::from_str(self.0.trim())
            .or_else(|_| Decimal::from_scientific(self.0.trim()))
            .map_err(|_| AppError::InvalidPrice(self.0.clone()))
    }

    /// Integer part, truncated toward zero
    pub fn integer_part(&self) -> Result<Decimal, AppError> {
        Ok(self.value()?.trunc())
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One day of OHLC data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub date: DateTime<Utc>,
    pub last_price: Price,
    pub opening_price: Price,
    pub max_price: Price,
    pub min_price: Price,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trades {
    pub coin_id: CoinId,
    pub modified_at: DateTime<Utc>,
    items: Vec<Trade>,
}

impl Trades {
    /// Build a history; items are sorted ascending by date
    pub fn new(coin_id: CoinId, modified_at: DateTime<Utc>, mut items: Vec<Trade>) -> Self {
        items.sort_by_key(|t| t.date);
        Self {
            coin_id,
            modified_at,
            items,
        }
    }

    pub fn items(&self) -> &[Trade] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_enough_trade(&self) -> bool {
        self.items.len() >= ENOUGH_TRADE_COUNT
    }

    /// Last price of the most recent day
    pub fn last_price(&self) -> Option<&Price> {
        self.items.last().map(|t| &t.last_price)
    }
}
