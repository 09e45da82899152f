/// Error type for cache and session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// A store operation failed.
    #[error("[{tier}] cache error for key '{key}': {message}")]
    Operation {
        tier: String,
        key: String,
        message: String,
    },
    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The caller's fetcher failed. Displays the fetcher's own message.
    #[error("{message}")]
    Fetch { message: String },
    /// A session was started without the environment it needs.
    #[error("missing context: {0}")]
    MissingContext(&'static str),
}

impl CacheError {
    /// Create a new operation error.
    pub fn operation(
        tier: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Operation {
            tier: tier.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a fetch error from anything the fetcher reported.
    pub fn fetch(message: impl Into<String>) -> Self {
        CacheError::Fetch {
            message: message.into(),
        }
    }

    /// Whether this error came from the fetcher rather than the cache layer.
    pub fn is_fetch(&self) -> bool {
        matches!(self, CacheError::Fetch { .. })
    }
}
