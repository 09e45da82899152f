use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

use crate::error::CacheError;
use crate::freshness;

/// A cached payload together with the time it was produced.
///
/// Only a successful fetch creates one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    /// The cached payload.
    pub data: V,

    /// Unix timestamp in milliseconds of when `data` was produced.
    pub timestamp: i64,
}

/// Type-erased storage entry that supports both typed and serialized storage.
///
/// Entries written by the fetch coordinator carry a `timestamp` marker. Values
/// placed into a shared store by the host carry none and are invisible to
/// session lookups, bulk invalidation and stats.
#[derive(Clone)]
pub enum StoredEntry {
    /// For in-memory stores: zero-copy storage of typed values.
    ///
    /// The value is kept as `Arc<dyn Any>` which is cheap to clone and can be
    /// downcast back to the original type without a serialization round.
    Typed {
        value: Arc<dyn Any + Send + Sync>,
        timestamp: Option<i64>,
        /// Converts the value to the JSON form of `CacheEntry<V>` when needed.
        serializer: Option<Arc<dyn Fn() -> Result<String, CacheError> + Send + Sync>>,
    },
    /// For process-external stores: JSON of a `CacheEntry<V>`, or an arbitrary
    /// host document when unmarked.
    Serialized { data: String, timestamp: Option<i64> },
}

/// Storage mode preference for stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Store prefers typed values (in-memory stores).
    #[default]
    Typed,
    /// Store prefers serialized values.
    Serialized,
}

impl<V> CacheEntry<V> {
    /// Create a new cache entry.
    pub fn new(data: V, timestamp: i64) -> Self {
        CacheEntry { data, timestamp }
    }

    /// Age of the entry in milliseconds at `now_ms`. Negative under clock skew.
    pub fn age(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.timestamp)
    }

    /// Check the entry against a staleness window.
    pub fn is_fresh(&self, stale_time_ms: i64, now_ms: i64) -> bool {
        freshness::is_fresh_at(self.timestamp, stale_time_ms, now_ms)
    }
}

impl<V> CacheEntry<V>
where
    V: Clone + Serialize + Send + Sync + 'static,
{
    /// Wrap this entry for a store with the given storage preference.
    pub fn into_stored(self, mode: StorageMode) -> Result<StoredEntry, CacheError> {
        match mode {
            StorageMode::Typed => Ok(StoredEntry::from_typed(self.data, self.timestamp)),
            StorageMode::Serialized => {
                let data = serde_json::to_string(&self).map_err(|e| {
                    CacheError::Serialization(format!("Serialization failed: {}", e))
                })?;
                Ok(StoredEntry::from_serialized(data, self.timestamp))
            }
        }
    }
}

impl StoredEntry {
    /// Create a marked entry from a typed value.
    ///
    /// The entry keeps a serializer so it can be converted for stores that
    /// prefer JSON.
    pub fn from_typed<V>(value: V, timestamp: i64) -> Self
    where
        V: Clone + Serialize + Send + Sync + 'static,
    {
        let value_arc = Arc::new(value);
        let value_for_serializer = value_arc.clone();

        let serializer = Arc::new(move || {
            let entry = CacheEntry::new(value_for_serializer.as_ref().clone(), timestamp);
            serde_json::to_string(&entry)
                .map_err(|e| CacheError::Serialization(format!("Serialization failed: {}", e)))
        });

        StoredEntry::Typed {
            value: value_arc,
            timestamp: Some(timestamp),
            serializer: Some(serializer),
        }
    }

    /// Create a marked entry from the JSON form of a `CacheEntry<V>`.
    pub fn from_serialized(data: String, timestamp: i64) -> Self {
        StoredEntry::Serialized {
            data,
            timestamp: Some(timestamp),
        }
    }

    /// A host-owned typed value without the cache marker.
    pub fn unmarked_typed<V>(value: V) -> Self
    where
        V: Send + Sync + 'static,
    {
        StoredEntry::Typed {
            value: Arc::new(value),
            timestamp: None,
            serializer: None,
        }
    }

    /// A host-owned serialized document without the cache marker.
    pub fn unmarked_serialized(data: impl Into<String>) -> Self {
        StoredEntry::Serialized {
            data: data.into(),
            timestamp: None,
        }
    }

    /// The timestamp marker, present only on entries written by this layer.
    pub fn timestamp(&self) -> Option<i64> {
        match self {
            StoredEntry::Typed { timestamp, .. } => *timestamp,
            StoredEntry::Serialized { timestamp, .. } => *timestamp,
        }
    }

    /// Whether this entry carries the cache wrapper's timestamp marker.
    pub fn is_marked(&self) -> bool {
        self.timestamp().is_some()
    }

    /// Convert to a typed `CacheEntry<V>`.
    ///
    /// - `Typed`: downcasts the `Arc` value to `V` and clones it
    /// - `Serialized`: deserializes the JSON document
    pub fn into_typed<V>(self) -> Result<CacheEntry<V>, CacheError>
    where
        V: Clone + for<'de> Deserialize<'de> + Send + Sync + 'static,
    {
        match self {
            StoredEntry::Typed {
                timestamp: None, ..
            }
            | StoredEntry::Serialized {
                timestamp: None, ..
            } => Err(CacheError::Serialization(
                "Entry does not carry a cache timestamp".to_string(),
            )),
            StoredEntry::Typed {
                value,
                timestamp: Some(timestamp),
                ..
            } => {
                let typed_arc = value
                    .downcast::<V>()
                    .map_err(|_| CacheError::Serialization("Type downcast failed".to_string()))?;

                Ok(CacheEntry {
                    data: (*typed_arc).clone(),
                    timestamp,
                })
            }
            StoredEntry::Serialized { data, .. } => {
                // Timestamps come from the document, which is what was originally written.
                serde_json::from_str(&data).map_err(|e| {
                    CacheError::Serialization(format!("Deserialization failed: {}", e))
                })
            }
        }
    }

    /// Convert a `Typed` entry to `Serialized` using the stored serializer.
    pub fn to_serialized(self) -> Result<Self, CacheError> {
        match self {
            StoredEntry::Serialized { .. } => Ok(self),
            StoredEntry::Typed {
                serializer: Some(ser),
                timestamp,
                ..
            } => {
                let data = ser()?;
                Ok(StoredEntry::Serialized { data, timestamp })
            }
            StoredEntry::Typed {
                serializer: None, ..
            } => Err(CacheError::Serialization(
                "Cannot serialize Typed entry: no serializer available".to_string(),
            )),
        }
    }

    /// Convert to match the target storage mode.
    ///
    /// Serialized entries are left as they are for typed stores; the reader
    /// deserializes them on access.
    pub fn convert_for_mode(self, target_mode: StorageMode) -> Result<Self, CacheError> {
        match (&self, target_mode) {
            (StoredEntry::Typed { .. }, StorageMode::Serialized) => self.to_serialized(),
            _ => Ok(self),
        }
    }
}

impl std::fmt::Debug for StoredEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoredEntry::Typed { timestamp, .. } => f
                .debug_struct("Typed")
                .field("timestamp", timestamp)
                .finish_non_exhaustive(),
            StoredEntry::Serialized { data, timestamp } => f
                .debug_struct("Serialized")
                .field("data", data)
                .field("timestamp", timestamp)
                .finish(),
        }
    }
}
