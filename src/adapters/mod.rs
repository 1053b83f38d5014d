//! Remote market-data adapters
//!
//! This module provides the `CoinService` abstraction and its Upbit
//! implementation, plus shared retry helpers.

pub mod errors;
pub mod shared;
pub mod traits;
pub mod upbit;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used types for convenience
pub use errors::{ServiceError, ServiceResult};
pub use shared::{retry_with_backoff, RetryConfig};
pub use traits::CoinService;
pub use upbit::{UpbitConfig, UpbitService};
