//! Read-side queries over the cache

use std::collections::HashSet;
use std::sync::Arc;

use super::types::{CoinId, Trades};
use crate::error::Result;
use crate::storage::CoinRepository;

#[derive(Clone)]
pub struct CoinQueryService {
    repo: Arc<dyn CoinRepository>,
}

impl CoinQueryService {
    pub fn new(repo: Arc<dyn CoinRepository>) -> Self {
        Self { repo }
    }

    /// IDs of cached coins that are not banned, sorted
    pub fn list_coins(&self) -> Result<Vec<CoinId>> {
        let banned: HashSet<CoinId> = self
            .repo
            .list_banned_coins()?
            .into_iter()
            .map(|b| b.coin_id)
            .collect();

        let mut ids: Vec<CoinId> = self
            .repo
            .list_coins()?
            .into_iter()
            .map(|c| c.id)
            .filter(|id| !banned.contains(id))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Cached history for `id`; NotFound when none was fetched yet
    pub fn list_trades(&self, id: &CoinId) -> Result<Trades> {
        Ok(self.repo.list_trades(id)?)
    }
}
