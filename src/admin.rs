//! Bulk invalidation and cache diagnostics.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CacheError;
use crate::freshness;
use crate::store::Store;
use crate::utils::now_ms;

/// One marked entry as seen by [`CacheAdmin::stats`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatsEntry {
    pub key: String,
    pub timestamp: i64,
    /// Milliseconds since `timestamp`. Negative under clock skew.
    pub age: i64,
    pub is_fresh: bool,
}

/// Occupancy of the cache's entries in a store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub keys: Vec<String>,
    pub entries: Vec<CacheStatsEntry>,
}

/// Admin surface over a store. Only entries written by this crate are touched.
#[derive(Clone)]
pub struct CacheAdmin {
    store: Arc<dyn Store>,
    default_stale_time: Duration,
}

impl CacheAdmin {
    pub fn new(store: Arc<dyn Store>, default_stale_time: Duration) -> Self {
        CacheAdmin {
            store,
            default_stale_time,
        }
    }

    /// Remove `key`, or every marked entry when `key` is `None`.
    ///
    /// Returns the number of keys removed. A named key that is not in the
    /// store counts as zero.
    pub async fn invalidate_all(&self, key: Option<&str>) -> Result<usize, CacheError> {
        if let Some(key) = key {
            if self.store.get(key).await?.is_none() {
                tracing::trace!(key, "nothing to invalidate");
                return Ok(0);
            }
            self.store.remove(&[key]).await?;
            tracing::debug!(key, "invalidated entry");
            return Ok(1);
        }

        let marked: Vec<String> = self
            .marked_entries()
            .await?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        if marked.is_empty() {
            return Ok(0);
        }

        let refs: Vec<&str> = marked.iter().map(String::as_str).collect();
        self.store.remove(&refs).await?;
        tracing::debug!(count = marked.len(), "invalidated all cache entries");
        Ok(marked.len())
    }

    /// Snapshot of every marked entry, judged against `stale_time` or the
    /// context default. Entries are ordered by key.
    pub async fn stats(&self, stale_time: Option<Duration>) -> Result<CacheStats, CacheError> {
        let stale_ms = freshness::window_ms(stale_time.unwrap_or(self.default_stale_time));
        let now = now_ms();

        let entries: Vec<CacheStatsEntry> = self
            .marked_entries()
            .await?
            .into_iter()
            .map(|(key, timestamp)| CacheStatsEntry {
                key,
                timestamp,
                age: now.saturating_sub(timestamp),
                is_fresh: freshness::is_fresh_at(timestamp, stale_ms, now),
            })
            .collect();

        Ok(CacheStats {
            size: entries.len(),
            keys: entries.iter().map(|e| e.key.clone()).collect(),
            entries,
        })
    }

    async fn marked_entries(&self) -> Result<Vec<(String, i64)>, CacheError> {
        let mut keys = self.store.keys().await?;
        keys.sort();

        let mut marked = Vec::with_capacity(keys.len());
        for key in keys {
            // A key may vanish between listing and reading.
            if let Some(timestamp) = self.store.get(&key).await?.and_then(|e| e.timestamp()) {
                marked.push((key, timestamp));
            }
        }
        Ok(marked)
    }
}

impl std::fmt::Debug for CacheAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAdmin")
            .field("store", &self.store.name())
            .field("default_stale_time", &self.default_stale_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::StoredEntry;
    use crate::stores::memory::{HashMapStore, HashMapStoreConfig};

    fn admin() -> (Arc<dyn Store>, CacheAdmin) {
        let store: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        let admin = CacheAdmin::new(store.clone(), Duration::from_secs(120));
        (store, admin)
    }

    #[tokio::test]
    async fn test_stats_on_empty_store() {
        let (_, admin) = admin();
        let stats = admin.stats(None).await.unwrap();
        assert_eq!(stats, CacheStats::default());
        assert_eq!(
            serde_json::to_value(&stats).unwrap(),
            serde_json::json!({ "size": 0, "keys": [], "entries": [] })
        );
    }

    #[tokio::test]
    async fn test_stats_reports_age_and_freshness() {
        let (store, admin) = admin();
        let now = now_ms();
        store
            .set("products-1", StoredEntry::from_typed(1_u32, now - 10_000))
            .await
            .unwrap();
        store
            .set("products-0", StoredEntry::from_typed(0_u32, now))
            .await
            .unwrap();
        store
            .set("theme", StoredEntry::unmarked_serialized("dark"))
            .await
            .unwrap();

        let stats = admin.stats(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.keys, vec!["products-0", "products-1"]);
        assert!(stats.entries[0].is_fresh);
        assert!(!stats.entries[1].is_fresh);
        assert!(stats.entries[1].age >= 10_000);

        let default_window = admin.stats(None).await.unwrap();
        assert!(default_window.entries.iter().all(|e| e.is_fresh));
    }

    #[tokio::test]
    async fn test_invalidate_all_spares_unmarked_entries() {
        let (store, admin) = admin();
        store
            .set("products-1", StoredEntry::from_typed(1_u32, 100))
            .await
            .unwrap();
        store
            .set("products-2", StoredEntry::from_typed(2_u32, 100))
            .await
            .unwrap();
        store
            .set("session-user", StoredEntry::unmarked_typed("ada".to_string()))
            .await
            .unwrap();

        assert_eq!(admin.invalidate_all(None).await.unwrap(), 2);
        assert!(store.get("products-1").await.unwrap().is_none());
        assert!(store.get("session-user").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_single_key() {
        let (store, admin) = admin();
        store
            .set("products-1", StoredEntry::from_typed(1_u32, 100))
            .await
            .unwrap();
        store
            .set("products-2", StoredEntry::from_typed(2_u32, 100))
            .await
            .unwrap();

        assert_eq!(admin.invalidate_all(Some("products-1")).await.unwrap(), 1);
        assert!(store.get("products-1").await.unwrap().is_none());
        assert!(store.get("products-2").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_missing_key_counts_zero() {
        let (store, admin) = admin();
        store
            .set("products-1", StoredEntry::from_typed(1_u32, 100))
            .await
            .unwrap();

        assert_eq!(admin.invalidate_all(Some("products-9")).await.unwrap(), 0);
        assert!(store.get("products-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stats_with_extreme_timestamp_saturates_age() {
        let (store, admin) = admin();
        store
            .set("products-1", StoredEntry::from_typed(1_u32, i64::MIN))
            .await
            .unwrap();
        store
            .set("products-2", StoredEntry::from_typed(2_u32, i64::MAX))
            .await
            .unwrap();

        let stats = admin.stats(None).await.unwrap();
        assert_eq!(stats.entries[0].age, i64::MAX);
        assert!(!stats.entries[0].is_fresh);
        assert!(stats.entries[1].age < 0);
        assert!(stats.entries[1].is_fresh);
    }
}
