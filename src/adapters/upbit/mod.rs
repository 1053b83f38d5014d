//! Upbit market-data adapter
//!
//! REST-only: the market listing (`/v1/market/all`) and daily candles
//! (`/v1/candles/days`).

pub mod adapter;
pub mod config;
pub mod types;

pub use adapter::UpbitService;
pub use config::UpbitConfig;
