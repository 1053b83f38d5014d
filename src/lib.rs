//! Coin cache
//!
//! Keeps a local cache of the markets listed by an exchange, their risk state
//! and their daily trade history:
//! - Miner: reconciles the cached coin list with the remote listing
//! - Prohibitor: bans coins by listing status, trade history, and lifts expired bans
//! - Trader: refreshes trade history for every coin that is not banned
//!
//! Components talk only through the in-process event bus and the repository.

pub mod adapters;
pub mod config;
pub mod core;
pub mod error;
pub mod server;
pub mod storage;

pub use error::AppError;
