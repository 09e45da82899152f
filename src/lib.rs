//! swr-query - stale-while-revalidate fetch sessions over a shared store
//!
//! This library wraps an async fetcher behind a cache keyed by a resolved
//! string and gives every call site one consistent view of it:
//! - Cached data is returned immediately, whatever its age
//! - Stale entries are refreshed in the background after hydration and,
//!   optionally, on focus, without flipping the call site back to pending
//! - Concurrent fetches for one key share a single computation
//! - Failed fetches are reported next to the data already shown, never
//!   written to the store
//!
//! # Example
//!
//! ```ignore
//! use swr_query::{HashMapStore, HashMapStoreConfig, SwrContext};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), swr_query::CacheError> {
//!     let ctx = SwrContext::builder()
//!         .store(Arc::new(HashMapStore::new(HashMapStoreConfig::default())))
//!         .build()?;
//!
//!     let products = ctx
//!         .run(
//!             "products-page-1",
//!             || async { Ok::<_, std::io::Error>(vec!["iPhone 9".to_string()]) },
//!             ctx.options().stale_time_ms(30_000),
//!         )
//!         .await?;
//!
//!     let settled = products.wait_for(|s| !s.pending).await;
//!     println!("{:?}", settled.data);
//!     Ok(())
//! }
//! ```

mod admin;
mod context;
mod coordinator;
mod entry;
mod error;
pub mod freshness;
mod host;
mod key;
mod options;
mod revalidate;
mod session;
mod signal;
mod status;
mod store;
pub mod stores;
mod utils;

// Re-export public API
pub use admin::{CacheAdmin, CacheStats, CacheStatsEntry};
pub use context::{SwrContext, SwrContextBuilder};
pub use entry::{CacheEntry, StorageMode, StoredEntry};
pub use error::CacheError;
pub use host::{FocusEvents, FocusListener, Hydration};
pub use key::KeySource;
pub use options::{SwrConfig, SwrOptions};
pub use session::SwrHandle;
pub use signal::{Debouncer, Signal, WatchSource};
pub use status::{Snapshot, Status, project_pending, project_status};
pub use store::Store;
pub use stores::memory::{EvictOnSetConfig, HashMapStore, HashMapStoreConfig};
pub use stores::metrics::{CacheEntryStatus, CacheMetric, MetricsSink, MetricsStore, TracingSink};
pub use stores::moka::{MokaStore, MokaStoreConfig};
pub use utils::now_ms;
