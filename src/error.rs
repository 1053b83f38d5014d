//! Application-wide error types using thiserror
//!
//! Every layer has its own error enum (storage, remote service, events,
//! scheduler); they are all wrapped in `AppError` so component operations
//! can use `?` across layer boundaries.

use std::time::Duration;

use thiserror::Error;

use crate::adapters::errors::ServiceError;
use crate::core::events::EventError;
use crate::core::scheduler::SchedulerError;
use crate::storage::StorageError;

/// Delay before redelivering an event whose handler hit a busy store
const STORE_BUSY_RETRY: Duration = Duration::from_millis(100);

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Invalid price '{0}'")]
    InvalidPrice(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Whether this error is the repository's NotFound condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::Storage(e) if e.is_not_found())
    }

    /// Delay after which the failed operation is worth redelivering.
    ///
    /// `None` means the error is permanent for the current event.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AppError::Storage(StorageError::Busy(_)) => Some(STORE_BUSY_RETRY),
            _ => None,
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
