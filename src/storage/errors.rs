//! Storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    /// No record under the given key
    #[error("Key not found: {0}")]
    NotFound(String),

    /// A record already exists under the given key
    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    /// The database is locked by another writer; the operation may succeed later
    #[error("Store busy: {0}")]
    Busy(String),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// Stored bytes could not be encoded or decoded as a record
    #[error("Record serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A thread panicked while holding the connection lock
    #[error("Store lock poisoned")]
    Poisoned,
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StorageError::AlreadyExists(_))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                StorageError::Busy(err.to_string())
            }
            _ => StorageError::Database(err),
        }
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;
