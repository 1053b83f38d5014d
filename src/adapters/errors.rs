//! Market-data service error types
//!
//! All remote-service errors are wrapped in `ServiceError` so callers can
//! tell retryable conditions (rate limiting, timeouts) from permanent ones.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// HTTP 429 from the remote API
    #[error("Too many requests, retry after {}ms", retry_after.as_millis())]
    TooManyRequests { retry_after: Duration },

    /// Transport failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status other than 429
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Body could not be mapped to domain types
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ServiceError>,
    },
}

impl ServiceError {
    /// Whether the request may succeed if simply sent again
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::TooManyRequests { .. } => true,
            ServiceError::Http(e) => e.is_timeout() || e.is_connect(),
            ServiceError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for market-data operations
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;
