//! Key-value store abstraction
//!
//! Keys and values are opaque bytes. Every operation is atomic for its key;
//! nothing spans more than one key.

use super::errors::StorageResult;

pub trait KeyValueStore: Send + Sync {
    /// Insert a new record. Fails with `AlreadyExists` if the key is taken.
    fn create(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Fetch a record. Fails with `NotFound` if the key is absent.
    fn get(&self, key: &[u8]) -> StorageResult<Vec<u8>>;

    /// Replace an existing record. Fails with `NotFound` if the key is absent.
    fn update(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Insert or replace a record.
    fn upsert(&self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Remove a record. Fails with `NotFound` if the key is absent.
    fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// All values whose key starts with `prefix`, in key order.
    fn list(&self, prefix: &[u8]) -> StorageResult<Vec<Vec<u8>>>;
}
