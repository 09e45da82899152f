//! The explicit environment sessions run in.
//!
//! A [`SwrContext`] bundles the host-owned store with the host's hydration and
//! focus signals and the context-wide defaults. It is cheap to clone; every
//! clone shares the same in-flight fetch table.

use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;
use std::sync::Arc;

use crate::admin::CacheAdmin;
use crate::coordinator::{Coordinator, wrap_fetcher};
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::host::{FocusEvents, Hydration};
use crate::key::KeySource;
use crate::options::{SwrConfig, SwrOptions};
use crate::session::{self, SwrHandle};
use crate::store::Store;

struct ContextInner {
    coordinator: Coordinator,
    hydration: Hydration,
    focus: FocusEvents,
    config: SwrConfig,
}

/// Handle to a store plus the host signals every session needs.
#[derive(Clone)]
pub struct SwrContext {
    inner: Arc<ContextInner>,
}

impl std::fmt::Debug for SwrContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwrContext")
            .field("store", &self.inner.coordinator.store().name())
            .field("hydrating", &self.inner.hydration.is_hydrating())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Builder for [`SwrContext`].
///
/// # Example
///
/// ```ignore
/// use swr_query::{HashMapStore, HashMapStoreConfig, SwrContext};
/// use std::sync::Arc;
///
/// let ctx = SwrContext::builder()
///     .store(Arc::new(HashMapStore::new(HashMapStoreConfig::default())))
///     .build()?;
/// ```
#[derive(Default)]
pub struct SwrContextBuilder {
    store: Option<Arc<dyn Store>>,
    hydration: Option<Hydration>,
    focus: Option<FocusEvents>,
    config: SwrConfig,
}

impl SwrContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared store. Required.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// The host's hydration signal. Defaults to already completed.
    pub fn hydration(mut self, hydration: Hydration) -> Self {
        self.hydration = Some(hydration);
        self
    }

    /// The host's focus signal. Defaults to a source nobody notifies.
    pub fn focus(mut self, focus: FocusEvents) -> Self {
        self.focus = Some(focus);
        self
    }

    pub fn config(mut self, config: SwrConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the context. Fails if no store was supplied.
    pub fn build(self) -> Result<SwrContext, CacheError> {
        let store = self.store.ok_or(CacheError::MissingContext("store"))?;
        tracing::debug!(store = store.name(), "swr context created");

        Ok(SwrContext {
            inner: Arc::new(ContextInner {
                coordinator: Coordinator::new(store),
                hydration: self.hydration.unwrap_or_default(),
                focus: self.focus.unwrap_or_default(),
                config: self.config,
            }),
        })
    }
}

impl SwrContext {
    pub fn builder() -> SwrContextBuilder {
        SwrContextBuilder::new()
    }

    /// Options seeded from the context's configuration.
    pub fn options(&self) -> SwrOptions {
        SwrOptions::from(&self.inner.config)
    }

    pub fn config(&self) -> &SwrConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        self.inner.coordinator.store()
    }

    pub fn hydration(&self) -> &Hydration {
        &self.inner.hydration
    }

    pub fn focus(&self) -> &FocusEvents {
        &self.inner.focus
    }

    /// Bulk invalidation and diagnostics over the context's store.
    pub fn admin(&self) -> CacheAdmin {
        CacheAdmin::new(Arc::clone(self.store()), self.inner.config.stale_time)
    }

    /// Start a call site.
    ///
    /// Resolves the key and reads the store; a hit is visible on the returned
    /// handle right away, whatever its age. A miss leaves the handle pending
    /// while the fetch runs in the background. Fetcher failures never surface
    /// here, only through the handle's error channel.
    ///
    /// Fails with [`CacheError::MissingContext`] when called outside a tokio runtime.
    pub async fn run<T, E, F, Fut>(
        &self,
        key: impl Into<KeySource>,
        fetcher: F,
        options: SwrOptions,
    ) -> Result<SwrHandle<T>, CacheError>
    where
        T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
        E: std::fmt::Display,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        tokio::runtime::Handle::try_current()
            .map_err(|_| CacheError::MissingContext("tokio runtime"))?;

        let loader = wrap_fetcher(fetcher, self.store().storage_mode());
        session::start(self.clone(), key.into(), loader, options).await
    }

    pub(crate) fn coordinator(&self) -> &Coordinator {
        &self.inner.coordinator
    }

    /// Read a marked entry for `key`. Store failures and foreign entries read as a miss.
    pub(crate) async fn lookup<T>(&self, key: &str) -> Option<CacheEntry<T>>
    where
        T: Clone + Send + Sync + DeserializeOwned + 'static,
    {
        let stored = match self.store().get(key).await {
            Ok(Some(stored)) if stored.is_marked() => stored,
            Ok(_) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "store lookup failed; treating as miss");
                return None;
            }
        };

        match stored.into_typed::<T>() {
            Ok(entry) => {
                tracing::trace!(key, timestamp = entry.timestamp, "cache hit");
                Some(entry)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "cached entry has unexpected shape; treating as miss");
                None
            }
        }
    }

    /// Timestamp of the marked entry for `key`, without decoding its payload.
    pub(crate) async fn entry_timestamp(&self, key: &str) -> Option<i64> {
        match self.store().get(key).await {
            Ok(stored) => stored.and_then(|s| s.timestamp()),
            Err(e) => {
                tracing::warn!(key, error = %e, "store lookup failed during staleness check");
                None
            }
        }
    }
}
