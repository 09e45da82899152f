//! Store implementations for the cache library.

pub mod memory;
pub mod metrics;
pub mod moka;

pub use memory::{EvictOnSetConfig, HashMapStore, HashMapStoreConfig};
pub use metrics::{CacheEntryStatus, CacheMetric, MetricsSink, MetricsStore, TracingSink};
pub use moka::{MokaStore, MokaStoreConfig};
