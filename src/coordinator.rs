//! Fetch coordination: wraps fetchers and runs at most one computation per key.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::Instrument;

use crate::entry::{CacheEntry, StorageMode, StoredEntry};
use crate::error::CacheError;
use crate::store::Store;
use crate::utils::now_ms;

/// A fetcher wrapped to produce timestamped, store-ready entries.
pub(crate) type Loader =
    Arc<dyn Fn() -> BoxFuture<'static, Result<StoredEntry, CacheError>> + Send + Sync>;

pub(crate) type Computation = Shared<BoxFuture<'static, Result<StoredEntry, CacheError>>>;

type ComputationMap = Arc<Mutex<HashMap<String, (u64, Computation)>>>;

/// Wrap a caller's fetcher so a success becomes a `CacheEntry { data, timestamp: now }`
/// in the store's preferred encoding.
pub(crate) fn wrap_fetcher<T, E, F, Fut>(fetcher: F, mode: StorageMode) -> Loader
where
    T: Clone + serde::Serialize + Send + Sync + 'static,
    E: std::fmt::Display,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    Arc::new(move || {
        let fut = fetcher();
        async move {
            let data = fut.await.map_err(|e| CacheError::fetch(e.to_string()))?;
            CacheEntry::new(data, now_ms()).into_stored(mode)
        }
        .boxed()
    })
}

/// Removes a finished computation from the in-flight map, unless a newer one replaced it.
struct RemoveOnDrop {
    computations: ComputationMap,
    key: String,
    id: u64,
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        let mut computations = self
            .computations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if computations.get(&self.key).is_some_and(|(id, _)| *id == self.id) {
            computations.remove(&self.key);
        }
    }
}

/// Runs fetch computations against a store, deduplicating concurrent ones per key.
///
/// Each computation is spawned onto the runtime, so its store write lands even
/// if every caller waiting on it went away.
#[derive(Clone)]
pub(crate) struct Coordinator {
    store: Arc<dyn Store>,
    computations: ComputationMap,
    next_id: Arc<AtomicU64>,
}

impl Coordinator {
    pub(crate) fn new(store: Arc<dyn Store>) -> Self {
        Coordinator {
            store,
            computations: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Number of computations currently in flight.
    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.computations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Fetch `key`, joining a computation already running for it.
    pub(crate) fn fetch(&self, key: &str, loader: &Loader) -> Computation {
        self.start(key, loader, false)
    }

    /// Start a new computation that first removes the stored entry.
    ///
    /// The computation is registered before the removal, so a concurrent reader
    /// that misses the store joins it instead of starting its own.
    pub(crate) fn invalidate(&self, key: &str, loader: &Loader) -> Computation {
        self.start(key, loader, true)
    }

    fn start(&self, key: &str, loader: &Loader, evict: bool) -> Computation {
        let mut computations = self
            .computations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if !evict {
            if let Some((_, computation)) = computations.get(key) {
                tracing::debug!(key, "joining in-flight fetch");
                return computation.clone();
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        let remove_token = RemoveOnDrop {
            computations: Arc::clone(&self.computations),
            key: key.to_string(),
            id,
        };

        let store = Arc::clone(&self.store);
        let load = Arc::clone(loader);
        let owned_key = key.to_string();
        let span = tracing::debug_span!("swr.fetch", key, evict);

        tokio::spawn(
            async move {
                let key = owned_key;
                if evict {
                    if let Err(e) = store.remove(&[key.as_str()]).await {
                        tracing::warn!(error = %e, "failed to remove entry before refetch");
                    }
                }

                tracing::debug!("fetch started");
                let result = load().await;
                match &result {
                    Ok(entry) => {
                        if let Err(e) = store.set(&key, entry.clone()).await {
                            tracing::warn!(error = %e, "failed to store fetched entry");
                        }
                        tracing::debug!("fetch succeeded");
                    }
                    Err(e) => tracing::debug!(error = %e, "fetch failed; store left untouched"),
                }

                // Evict from the map before publishing, so later callers either
                // receive this result or start a new computation.
                drop(remove_token);
                sender.send(result).ok();
            }
            .instrument(span),
        );

        let tier = self.store.name();
        let dropped_key = key.to_string();
        let computation = receiver
            .map(move |received| {
                received.unwrap_or_else(|_| {
                    Err(CacheError::operation(
                        tier,
                        dropped_key,
                        "fetch computation dropped",
                    ))
                })
            })
            .boxed()
            .shared();

        let replaced = computations.insert(key.to_string(), (id, computation.clone()));
        if replaced.is_some() {
            tracing::debug!(key, "replaced in-flight fetch");
        }
        computation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::{HashMapStore, HashMapStoreConfig};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_loader(calls: Arc<AtomicUsize>, delay: Duration) -> Loader {
        wrap_fetcher(
            move || {
                let calls = calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    tokio::time::sleep(delay).await;
                    Ok::<_, CacheError>(n)
                }
            },
            StorageMode::Typed,
        )
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_computation() {
        let store: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        let coordinator = Coordinator::new(store.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(calls.clone(), Duration::from_millis(20));

        let a = coordinator.fetch("k", &loader);
        let b = coordinator.fetch("k", &loader);
        assert_eq!(coordinator.in_flight(), 1);

        let (a, b) = futures::join!(a, b);
        let a: CacheEntry<usize> = a.unwrap().into_typed().unwrap();
        let b: CacheEntry<usize> = b.unwrap().into_typed().unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a, b);
        assert_eq!(coordinator.in_flight(), 0);

        let stored: CacheEntry<usize> = store.get("k").await.unwrap().unwrap().into_typed().unwrap();
        assert_eq!(stored.data, 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_fetch_independently() {
        let store: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        let coordinator = Coordinator::new(store);
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(calls.clone(), Duration::from_millis(5));

        let (a, b) = futures::join!(coordinator.fetch("a", &loader), coordinator.fetch("b", &loader));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_entry_untouched() {
        let store: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        store
            .set("k", StoredEntry::from_typed(7_usize, 100))
            .await
            .unwrap();
        let coordinator = Coordinator::new(store.clone());
        let loader = wrap_fetcher(|| async { Err::<usize, _>("X") }, StorageMode::Typed);

        let result = coordinator.fetch("k", &loader).await;
        assert_eq!(result.unwrap_err(), CacheError::fetch("X"));

        let stored: CacheEntry<usize> = store.get("k").await.unwrap().unwrap().into_typed().unwrap();
        assert_eq!(stored, CacheEntry::new(7, 100));
    }

    #[tokio::test]
    async fn test_invalidate_starts_new_computation_and_evicts() {
        let store: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        store
            .set("k", StoredEntry::from_typed(0_usize, 100))
            .await
            .unwrap();
        let coordinator = Coordinator::new(store.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(calls.clone(), Duration::from_millis(20));

        let first = coordinator.fetch("k", &loader);
        let second = coordinator.invalidate("k", &loader);
        let (first, second) = futures::join!(first, second);
        assert!(first.is_ok() && second.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.in_flight(), 0);

        let stored: CacheEntry<usize> = store.get("k").await.unwrap().unwrap().into_typed().unwrap();
        assert!(stored.timestamp > 100);
    }

    #[tokio::test]
    async fn test_failed_invalidate_leaves_no_entry() {
        let store: Arc<dyn Store> = Arc::new(HashMapStore::new(HashMapStoreConfig::default()));
        store
            .set("k", StoredEntry::from_typed(1_usize, 100))
            .await
            .unwrap();
        let coordinator = Coordinator::new(store.clone());
        let loader = wrap_fetcher(|| async { Err::<usize, _>("offline") }, StorageMode::Typed);

        assert!(coordinator.invalidate("k", &loader).await.is_err());
        assert!(store.get("k").await.unwrap().is_none());
    }
}
