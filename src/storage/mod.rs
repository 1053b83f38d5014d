//! Persistence layer
//!
//! - `KeyValueStore`: byte-key/byte-value CRUD with existence checks
//! - `SqliteStore`: the on-disk implementation (rusqlite)
//! - `CoinRepository` / `KvRepository`: typed records on top of a store

mod errors;
mod repository;
mod sqlite;
mod store;

pub use errors::{StorageError, StorageResult};
pub use repository::{CoinRepository, KvRepository};
pub use sqlite::SqliteStore;
pub use store::KeyValueStore;
