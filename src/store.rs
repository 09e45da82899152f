use async_trait::async_trait;

use crate::entry::{StorageMode, StoredEntry};
use crate::error::CacheError;

/// A store is the shared key-value mapping sessions read and write through.
///
/// Stores are type-agnostic and hold `StoredEntry` values which can be either
/// typed (for in-memory stores) or serialized JSON. The host owns the store; a
/// context only ever holds a handle to it.
#[async_trait]
pub trait Store: Send + Sync {
    /// A name for metrics/tracing.
    ///
    /// # Example
    /// - "hashmap"
    /// - "moka"
    fn name(&self) -> &'static str;

    /// Returns the storage mode preference for this store.
    ///
    /// Default implementation returns `Serialized` for safety.
    fn storage_mode(&self) -> StorageMode {
        StorageMode::Serialized
    }

    /// Return the stored entry. `None` for misses.
    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError>;

    /// Sets the entry for the given key, replacing any previous one.
    async fn set(&self, key: &str, entry: StoredEntry) -> Result<(), CacheError>;

    /// Removes the key(s) from the store.
    async fn remove(&self, keys: &[&str]) -> Result<(), CacheError>;

    /// Every key currently held, marked or not.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;
}
