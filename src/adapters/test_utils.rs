//! Test utilities for components that depend on a `CoinService`
//!
//! `MockCoinService` serves a scripted listing and per-coin trade
//! histories, and counts how often each endpoint was hit. Trade requests
//! can be slowed down to hold a refresh in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::adapters::errors::{ServiceError, ServiceResult};
use crate::adapters::traits::CoinService;
use crate::core::types::{Coin, CoinId, Trades};

#[derive(Default)]
pub struct MockCoinService {
    coins: Mutex<Vec<Coin>>,
    trades: Mutex<HashMap<CoinId, Trades>>,
    list_coins_calls: AtomicUsize,
    list_trades_calls: AtomicUsize,
    trades_delay: Mutex<Option<Duration>>,
}

impl MockCoinService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listing; every coin gets the given risk flag
    pub fn set_coins(&self, coins: &[(&str, bool)]) {
        let now = Utc::now();
        *self.coins.lock().unwrap() = coins
            .iter()
            .map(|(id, danger)| Coin::new(*id, *danger, now))
            .collect();
    }

    pub fn set_trades(&self, trades: Trades) {
        self.trades.lock().unwrap().insert(trades.coin_id.clone(), trades);
    }

    /// Delay every `list_trades` response by `delay`
    pub fn set_trades_delay(&self, delay: Duration) {
        *self.trades_delay.lock().unwrap() = Some(delay);
    }

    pub fn list_coins_calls(&self) -> usize {
        self.list_coins_calls.load(Ordering::SeqCst)
    }

    pub fn list_trades_calls(&self) -> usize {
        self.list_trades_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CoinService for MockCoinService {
    async fn list_coins(&self) -> ServiceResult<Vec<Coin>> {
        self.list_coins_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.coins.lock().unwrap().clone())
    }

    async fn list_trades(&self, id: &CoinId) -> ServiceResult<Trades> {
        self.list_trades_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.trades_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.trades
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::InvalidResponse(format!("no candles for {}", id)))
    }
}
