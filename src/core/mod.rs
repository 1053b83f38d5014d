//! Core module - event bus, scheduler, and the three cache components
//!
//! - [`Miner`]: reconciles the cached coin list with the remote listing
//! - [`Prohibitor`]: bans and unbans coins by status, trade history and expiry
//! - [`Trader`]: keeps one trade-history refresh job per tradable coin
//!
//! Components never call each other; they meet on the [`EventBus`] and the
//! shared repository.
//!
//! This module uses **explicit re-exports** instead of glob exports so the
//! public API stays visible here. When adding new public types to submodules,
//! add them to the re-exports below.

pub mod bus;
pub mod events;
pub mod flow;
pub mod miner;
pub mod prohibitor;
pub mod scheduler;
pub mod trader;
pub mod types;

// Explicit re-exports for bus module
pub use bus::{EventBus, EventHandler, HandlerOutcome};

// Explicit re-exports for events module
pub use events::{
    topics, BannedCoinCreated, BannedCoinDeleted, CoinCreated, CoinDeleted, CoinUpdated, Event,
    EventError, EventPayload, EventResult, TradesDeleted, TradesUpdated,
};

// Explicit re-exports for scheduler module
pub use scheduler::{JobId, Scheduler, SchedulerError, SchedulerResult};

// Explicit re-exports for types module
pub use types::{
    BannedCoin, Coin, CoinId, Price, Trade, Trades, COIN_REFRESH_PERIOD_SECS, ENOUGH_TRADE_COUNT,
};

// Explicit re-exports for components
pub use flow::CoinQueryService;
pub use miner::{Miner, ReconcileReport};
pub use prohibitor::{status_ban_period, trade_ban_period, Prohibitor};
pub use trader::Trader;
