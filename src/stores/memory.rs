use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::entry::{StorageMode, StoredEntry};
use crate::error::CacheError;
use crate::store::Store;

/// Configuration for eviction on set operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictOnSetConfig {
    /// Provide a number between 0 and 1 to calculate whether eviction should run on each set.
    ///
    /// - `1.0` -> run eviction on every `set`
    /// - `0.5` -> run eviction on every 2nd `set` (on average)
    /// - `0.0` -> disable eviction
    pub frequency: f64,

    /// Remove items until the number of items in the map is at most `max_items`.
    pub max_items: usize,
}

/// Configuration for HashMapStore.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HashMapStoreConfig {
    /// Trim the map on `set` operations.
    pub evict_on_set: Option<EvictOnSetConfig>,

    /// How entries are held. `Serialized` behaves like a process-external store.
    pub storage_mode: StorageMode,
}

/// Thread-safe in-memory store using HashMap with RwLock.
///
/// This is a simple store suitable for:
/// - Session-scoped payload maps shared by a handful of call sites
/// - Small to medium cache sizes (<1000 items)
///
/// For high-concurrency scenarios, consider using `MokaStore` instead.
pub struct HashMapStore {
    state: RwLock<HashMap<String, StoredEntry>>,
    evict_on_set: Option<EvictOnSetConfig>,
    storage_mode: StorageMode,
}

impl HashMapStore {
    /// Create a new HashMapStore with the given configuration.
    pub fn new(config: HashMapStoreConfig) -> Self {
        HashMapStore {
            state: RwLock::new(HashMap::new()),
            evict_on_set: config.evict_on_set,
            storage_mode: config.storage_mode,
        }
    }

    /// Number of entries currently held.
    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_empty()
    }

    /// Run eviction if configured and random check passes.
    async fn maybe_evict(&self) {
        let Some(ref config) = self.evict_on_set else {
            return;
        };

        if config.frequency <= 0.0 {
            return;
        }

        let should_evict = config.frequency >= 1.0 || rand::random::<f64>() < config.frequency;
        if !should_evict {
            return;
        }

        let mut state = self.state.write().await;
        if state.len() <= config.max_items {
            return;
        }

        // Oldest cache entries go first; host-owned entries go last.
        let mut entries: Vec<_> = state
            .iter()
            .map(|(k, v)| (k.clone(), v.timestamp().unwrap_or(i64::MAX)))
            .collect();
        entries.sort_by_key(|(_, timestamp)| *timestamp);

        let to_remove = state.len() - config.max_items;
        for (key, _) in entries.into_iter().take(to_remove) {
            tracing::trace!(key = %key, "evicting entry from hashmap store");
            state.remove(&key);
        }
    }
}

#[async_trait]
impl Store for HashMapStore {
    fn name(&self) -> &'static str {
        "hashmap"
    }

    fn storage_mode(&self) -> StorageMode {
        self.storage_mode
    }

    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let state = self.state.read().await;
        Ok(state.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: StoredEntry) -> Result<(), CacheError> {
        let entry = entry.convert_for_mode(self.storage_mode)?;

        {
            let mut state = self.state.write().await;
            state.insert(key.to_string(), entry);
        }

        self.maybe_evict().await;
        Ok(())
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), CacheError> {
        let mut state = self.state.write().await;

        for key in keys {
            state.remove(*key);
        }

        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let state = self.state.read().await;
        Ok(state.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::CacheEntry;

    #[tokio::test]
    async fn test_get_set_remove() {
        let store = HashMapStore::new(HashMapStoreConfig::default());

        // Initially empty
        let result = store.get("product-1").await.unwrap();
        assert!(result.is_none());

        store
            .set("product-1", StoredEntry::from_typed("value1".to_string(), 1_000))
            .await
            .unwrap();

        let result = store.get("product-1").await.unwrap();
        let entry: CacheEntry<String> = result.unwrap().into_typed().unwrap();
        assert_eq!(entry.data, "value1");
        assert_eq!(entry.timestamp, 1_000);

        store.remove(&["product-1"]).await.unwrap();

        let result = store.get("product-1").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_keys_include_unmarked_entries() {
        let store = HashMapStore::new(HashMapStoreConfig::default());
        store
            .set("a", StoredEntry::from_typed(1_u32, 1))
            .await
            .unwrap();
        store
            .set("b", StoredEntry::unmarked_typed("host"))
            .await
            .unwrap();

        let mut keys = store.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_serialized_mode_converts_typed_entries() {
        let store = HashMapStore::new(HashMapStoreConfig {
            storage_mode: StorageMode::Serialized,
            ..Default::default()
        });
        store
            .set("k", StoredEntry::from_typed(7_u32, 99))
            .await
            .unwrap();

        let stored = store.get("k").await.unwrap().unwrap();
        assert!(matches!(stored, StoredEntry::Serialized { .. }));
        let entry: CacheEntry<u32> = stored.into_typed().unwrap();
        assert_eq!(entry, CacheEntry::new(7, 99));
    }

    #[tokio::test]
    async fn test_evict_on_set_drops_oldest() {
        let store = HashMapStore::new(HashMapStoreConfig {
            evict_on_set: Some(EvictOnSetConfig {
                frequency: 1.0,
                max_items: 2,
            }),
            ..Default::default()
        });

        store.set("old", StoredEntry::from_typed(1_u32, 10)).await.unwrap();
        store.set("host", StoredEntry::unmarked_typed(0_u32)).await.unwrap();
        store.set("new", StoredEntry::from_typed(2_u32, 30)).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("host").await.unwrap().is_some());
        assert!(store.get("new").await.unwrap().is_some());
    }
}
