//! Remote market-data service trait
//!
//! The reconciliation engine reads the listing through `list_coins`, the
//! refresh jobs read daily history through `list_trades`.

use async_trait::async_trait;

use crate::adapters::errors::ServiceResult;
use crate::core::types::{Coin, CoinId, Trades};

/// Source of truth for listings and trade history
///
/// # Example Implementation
///
/// ```ignore
/// struct StaticService(Vec<Coin>);
///
/// #[async_trait]
/// impl CoinService for StaticService {
///     async fn list_coins(&self) -> ServiceResult<Vec<Coin>> {
///         Ok(self.0.clone())
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait CoinService: Send + Sync {
    /// Current listing, with each coin's risk flag and `modified_at` set to
    /// the fetch time
    async fn list_coins(&self) -> ServiceResult<Vec<Coin>>;

    /// Latest daily history for one coin, sorted ascending by date
    async fn list_trades(&self, id: &CoinId) -> ServiceResult<Trades>;
}
