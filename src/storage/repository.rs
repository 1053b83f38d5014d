//! Typed repository over a key-value store
//!
//! Records are JSON under three key prefixes:
//! - `coin:{id}`
//! - `banned_coin:{id}`
//! - `trades:{id}`

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::errors::StorageResult;
use super::store::KeyValueStore;
use crate::core::types::{BannedCoin, Coin, CoinId, Trades};

const COIN_PREFIX: &str = "coin:";
const BANNED_COIN_PREFIX: &str = "banned_coin:";
const TRADES_PREFIX: &str = "trades:";

/// System of record for coins, bans and trade histories.
///
/// Lookups of a missing record fail with `StorageError::NotFound`; creating
/// a record that exists fails with `StorageError::AlreadyExists`.
pub trait CoinRepository: Send + Sync {
    fn list_coins(&self) -> StorageResult<Vec<Coin>>;
    fn get_coin(&self, id: &CoinId) -> StorageResult<Coin>;
    fn create_coin(&self, coin: &Coin) -> StorageResult<()>;
    fn update_coin(&self, coin: &Coin) -> StorageResult<()>;
    fn delete_coin(&self, id: &CoinId) -> StorageResult<()>;

    fn list_banned_coins(&self) -> StorageResult<Vec<BannedCoin>>;
    fn get_banned_coin(&self, id: &CoinId) -> StorageResult<BannedCoin>;
    fn create_banned_coin(&self, banned: &BannedCoin) -> StorageResult<()>;
    fn delete_banned_coin(&self, id: &CoinId) -> StorageResult<()>;

    /// Insert or replace the history for `trades.coin_id`
    fn save_trades(&self, trades: &Trades) -> StorageResult<()>;
    fn list_trades(&self, id: &CoinId) -> StorageResult<Trades>;
    fn delete_trades(&self, id: &CoinId) -> StorageResult<()>;
}

// ============================================================================
// Records
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct CoinRecord {
    id: CoinId,
    danger: bool,
    modified_at: DateTime<Utc>,
}

impl From<&Coin> for CoinRecord {
    fn from(coin: &Coin) -> Self {
        Self {
            id: coin.id.clone(),
            danger: coin.danger,
            modified_at: coin.modified_at,
        }
    }
}

impl From<CoinRecord> for Coin {
    fn from(record: CoinRecord) -> Self {
        Coin::new(record.id, record.danger, record.modified_at)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BannedCoinRecord {
    coin_id: CoinId,
    banned_at: DateTime<Utc>,
    period_secs: i64,
}

impl From<&BannedCoin> for BannedCoinRecord {
    fn from(banned: &BannedCoin) -> Self {
        Self {
            coin_id: banned.coin_id.clone(),
            banned_at: banned.banned_at,
            period_secs: banned.period.num_seconds(),
        }
    }
}

impl From<BannedCoinRecord> for BannedCoin {
    fn from(record: BannedCoinRecord) -> Self {
        BannedCoin::new(
            record.coin_id,
            record.banned_at,
            Duration::seconds(record.period_secs),
        )
    }
}

// ============================================================================
// KvRepository
// ============================================================================

pub struct KvRepository<S> {
    store: S,
}

impl<S: KeyValueStore> KvRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn key(prefix: &str, id: &CoinId) -> Vec<u8> {
        format!("{}{}", prefix, id).into_bytes()
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn decode_all<T: DeserializeOwned>(values: Vec<Vec<u8>>) -> StorageResult<Vec<T>> {
        values.iter().map(|v| Self::decode(v)).collect()
    }
}

impl<S: KeyValueStore> CoinRepository for KvRepository<S> {
    fn list_coins(&self) -> StorageResult<Vec<Coin>> {
        let records: Vec<CoinRecord> = Self::decode_all(self.store.list(COIN_PREFIX.as_bytes())?)?;
        Ok(records.into_iter().map(Coin::from).collect())
    }

    fn get_coin(&self, id: &CoinId) -> StorageResult<Coin> {
        let record: CoinRecord = Self::decode(&self.store.get(&Self::key(COIN_PREFIX, id))?)?;
        Ok(record.into())
    }

    fn create_coin(&self, coin: &Coin) -> StorageResult<()> {
        let value = serde_json::to_vec(&CoinRecord::from(coin))?;
        self.store.create(&Self::key(COIN_PREFIX, &coin.id), &value)
    }

    fn update_coin(&self, coin: &Coin) -> StorageResult<()> {
        let value = serde_json::to_vec(&CoinRecord::from(coin))?;
        self.store.update(&Self::key(COIN_PREFIX, &coin.id), &value)
    }

    fn delete_coin(&self, id: &CoinId) -> StorageResult<()> {
        self.store.delete(&Self::key(COIN_PREFIX, id))
    }

    fn list_banned_coins(&self) -> StorageResult<Vec<BannedCoin>> {
        let records: Vec<BannedCoinRecord> =
            Self::decode_all(self.store.list(BANNED_COIN_PREFIX.as_bytes())?)?;
        Ok(records.into_iter().map(BannedCoin::from).collect())
    }

    fn get_banned_coin(&self, id: &CoinId) -> StorageResult<BannedCoin> {
        let record: BannedCoinRecord =
            Self::decode(&self.store.get(&Self::key(BANNED_COIN_PREFIX, id))?)?;
        Ok(record.into())
    }

    fn create_banned_coin(&self, banned: &BannedCoin) -> StorageResult<()> {
        let value = serde_json::to_vec(&BannedCoinRecord::from(banned))?;
        self.store
            .create(&Self::key(BANNED_COIN_PREFIX, &banned.coin_id), &value)
    }

    fn delete_banned_coin(&self, id: &CoinId) -> StorageResult<()> {
        self.store.delete(&Self::key(BANNED_COIN_PREFIX, id))
    }

    fn save_trades(&self, trades: &Trades) -> StorageResult<()> {
        let value = serde_json::to_vec(trades)?;
        self.store.upsert(&Self::key(TRADES_PREFIX, &trades.coin_id), &value)
    }

    fn list_trades(&self, id: &CoinId) -> StorageResult<Trades> {
        Self::decode(&self.store.get(&Self::key(TRADES_PREFIX, id))?)
    }

    fn delete_trades(&self, id: &CoinId) -> StorageResult<()> {
        self.store.delete(&Self::key(TRADES_PREFIX, id))
    }
}
