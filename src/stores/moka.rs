use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::entry::{StorageMode, StoredEntry};
use crate::error::CacheError;
use crate::store::Store;

/// Configuration for MokaStore.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MokaStoreConfig {
    /// Maximum number of entries the cache can hold.
    pub max_capacity: u64,

    /// Time to live: entries are expired after this duration from insertion.
    /// `None` keeps entries for the whole session (only the size limit applies).
    #[serde(with = "humantime_serde")]
    pub time_to_live: Option<Duration>,

    /// Time to idle: entries are expired if not accessed within this duration.
    #[serde(with = "humantime_serde")]
    pub time_to_idle: Option<Duration>,
}

impl Default for MokaStoreConfig {
    fn default() -> Self {
        MokaStoreConfig {
            max_capacity: 10_000,
            time_to_live: None,
            time_to_idle: None,
        }
    }
}

/// High-performance concurrent store using Moka.
///
/// Expiry here only bounds memory. Staleness is decided by the freshness
/// policy from each entry's timestamp, so an entry stays servable until Moka
/// evicts it.
pub struct MokaStore {
    cache: Cache<String, StoredEntry>,
}

impl MokaStore {
    /// Create a new MokaStore with the given configuration.
    ///
    /// # Example
    /// ```ignore
    /// let config = MokaStoreConfig {
    ///     max_capacity: 10_000,
    ///     time_to_live: Some(Duration::from_secs(3600)),
    ///     time_to_idle: None,
    /// };
    /// let store = MokaStore::new(config);
    /// ```
    pub fn new(config: MokaStoreConfig) -> Self {
        let mut builder = Cache::builder()
            .name("swr-query")
            .max_capacity(config.max_capacity);

        if let Some(ttl) = config.time_to_live {
            builder = builder.time_to_live(ttl);
        }

        if let Some(tti) = config.time_to_idle {
            builder = builder.time_to_idle(tti);
        }

        MokaStore {
            cache: builder.build(),
        }
    }

    /// Get cache statistics (for monitoring/debugging).
    pub fn stats(&self) -> (u64, u64) {
        (self.cache.entry_count(), self.cache.weighted_size())
    }
}

#[async_trait]
impl Store for MokaStore {
    fn name(&self) -> &'static str {
        "moka"
    }

    fn storage_mode(&self) -> StorageMode {
        StorageMode::Typed
    }

    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        Ok(self.cache.get(key).await)
    }

    async fn set(&self, key: &str, entry: StoredEntry) -> Result<(), CacheError> {
        // Moka handles eviction automatically based on capacity
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), CacheError> {
        for key in keys {
            self.cache.invalidate(*key).await;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self
            .cache
            .iter()
            .map(|(key, _)| key.as_ref().clone())
            .collect())
    }
}
