//! Metrics middleware for cache stores.
//!
//! This module provides a `MetricsStore` wrapper that emits metrics for all
//! store operations (reads, writes, removes) to a user-provided sink.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use swr_query::{MokaStore, MokaStoreConfig, Store, SwrContext};
//! use swr_query::stores::{MetricsStore, TracingSink};
//!
//! let moka: Arc<dyn Store> = Arc::new(MokaStore::new(MokaStoreConfig::default()));
//! let store = Arc::new(MetricsStore::new(moka, Arc::new(TracingSink), 120_000));
//!
//! let ctx = SwrContext::builder().store(store).build()?;
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::entry::{StorageMode, StoredEntry};
use crate::error::CacheError;
use crate::freshness;
use crate::store::Store;

/// Freshness of a cache entry on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEntryStatus {
    /// Entry is inside the staleness window.
    Fresh,
    /// Entry is older than the staleness window but still served.
    Stale,
}

/// Metrics emitted by the MetricsStore wrapper.
#[derive(Debug, Clone)]
pub enum CacheMetric {
    /// Emitted on every read (get) operation.
    Read {
        /// The key that was read.
        key: String,
        /// Whether a cache entry was found. Host-owned entries count as misses.
        hit: bool,
        /// Freshness of the entry (only present when hit=true).
        status: Option<CacheEntryStatus>,
        /// Latency of the operation in milliseconds.
        latency_ms: f64,
        /// Name of the wrapped store (from Store::name()).
        tier: String,
    },
    /// Emitted on every write (set) operation.
    Write {
        key: String,
        latency_ms: f64,
        tier: String,
    },
    /// Emitted on every remove operation.
    Remove {
        /// Number of keys in the remove batch.
        key_count: usize,
        /// First key in the batch (for debugging/identification).
        first_key: Option<String>,
        latency_ms: f64,
        tier: String,
    },
}

/// Trait for receiving cache metrics.
///
/// `emit` is called synchronously in the hot path of store operations, so
/// implementations should only buffer or forward.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Emit a single metric.
    fn emit(&self, metric: CacheMetric);

    /// Flush any buffered metrics.
    async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// A sink that forwards every metric as a `tracing` debug event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl MetricsSink for TracingSink {
    fn emit(&self, metric: CacheMetric) {
        match metric {
            CacheMetric::Read {
                key,
                hit,
                status,
                latency_ms,
                tier,
            } => tracing::debug!(key = %key, hit, ?status, latency_ms, tier = %tier, "cache.read"),
            CacheMetric::Write {
                key,
                latency_ms,
                tier,
            } => tracing::debug!(key = %key, latency_ms, tier = %tier, "cache.write"),
            CacheMetric::Remove {
                key_count,
                first_key,
                latency_ms,
                tier,
            } => tracing::debug!(key_count, ?first_key, latency_ms, tier = %tier, "cache.remove"),
        }
    }

    async fn flush(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// A store wrapper that emits metrics for all operations.
pub struct MetricsStore {
    inner: Arc<dyn Store>,
    sink: Arc<dyn MetricsSink>,
    tier_name: String,
    stale_time_ms: i64,
}

impl MetricsStore {
    /// Create a new MetricsStore wrapping the given store.
    ///
    /// # Arguments
    /// * `inner` - The store to wrap
    /// * `sink` - The metrics sink to emit metrics to
    /// * `stale_time_ms` - Window used to classify read hits as fresh or stale
    pub fn new(inner: Arc<dyn Store>, sink: Arc<dyn MetricsSink>, stale_time_ms: i64) -> Self {
        let tier_name = inner.name().to_string();
        MetricsStore {
            inner,
            sink,
            tier_name,
            stale_time_ms,
        }
    }

    /// Get a reference to the metrics sink.
    pub fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    fn elapsed_ms(start: Instant) -> f64 {
        start.elapsed().as_secs_f64() * 1000.0
    }
}

#[async_trait]
impl Store for MetricsStore {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn storage_mode(&self) -> StorageMode {
        self.inner.storage_mode()
    }

    async fn get(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let start = Instant::now();
        let result = self.inner.get(key).await;
        let latency_ms = Self::elapsed_ms(start);

        let timestamp = match &result {
            Ok(Some(entry)) => entry.timestamp(),
            Ok(None) | Err(_) => None,
        };
        let status = timestamp.map(|ts| {
            if freshness::is_fresh(ts, self.stale_time_ms) {
                CacheEntryStatus::Fresh
            } else {
                CacheEntryStatus::Stale
            }
        });

        self.sink.emit(CacheMetric::Read {
            key: key.to_string(),
            hit: status.is_some(),
            status,
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }

    async fn set(&self, key: &str, entry: StoredEntry) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.inner.set(key, entry).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(CacheMetric::Write {
            key: key.to_string(),
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }

    async fn remove(&self, keys: &[&str]) -> Result<(), CacheError> {
        let start = Instant::now();
        let result = self.inner.remove(keys).await;
        let latency_ms = Self::elapsed_ms(start);

        self.sink.emit(CacheMetric::Remove {
            key_count: keys.len(),
            first_key: keys.first().map(|k| k.to_string()),
            latency_ms,
            tier: self.tier_name.clone(),
        });

        result
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        self.inner.keys().await
    }
}
