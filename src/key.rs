use std::sync::Arc;

use crate::signal::{Signal, WatchSource};

type KeyFn = Arc<dyn Fn() -> String + Send + Sync>;

/// How a call site names its query.
///
/// Resolution is deterministic and side-effect free: the same inputs always
/// produce the same key.
#[derive(Clone)]
pub enum KeySource {
    /// A fixed key.
    Literal(String),
    /// The current value of a signal.
    Signal(Signal<String>),
    /// A computed key, re-evaluated whenever one of `deps` changes.
    Computed {
        compute: KeyFn,
        deps: Vec<WatchSource>,
    },
}

impl KeySource {
    /// A computed key with the signals it reads from.
    ///
    /// # Example
    /// ```ignore
    /// let page = Signal::new(1);
    /// let p = page.clone();
    /// let key = KeySource::computed(move || format!("products-{}", p.get()), [page.watch()]);
    /// ```
    pub fn computed<F>(compute: F, deps: impl IntoIterator<Item = WatchSource>) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        KeySource::Computed {
            compute: Arc::new(compute),
            deps: deps.into_iter().collect(),
        }
    }

    /// Resolve to the key for the current inputs.
    pub fn resolve(&self) -> String {
        match self {
            KeySource::Literal(key) => key.clone(),
            KeySource::Signal(signal) => signal.get(),
            KeySource::Computed { compute, .. } => compute(),
        }
    }

    /// Change streams whose notification means the key must be re-resolved.
    pub(crate) fn sources(&self) -> Vec<WatchSource> {
        match self {
            KeySource::Literal(_) => Vec::new(),
            KeySource::Signal(signal) => vec![signal.watch()],
            KeySource::Computed { deps, .. } => deps.clone(),
        }
    }
}

impl std::fmt::Debug for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::Literal(key) => f.debug_tuple("Literal").field(key).finish(),
            KeySource::Signal(signal) => f.debug_tuple("Signal").field(signal).finish(),
            KeySource::Computed { deps, .. } => f
                .debug_struct("Computed")
                .field("deps", &deps.len())
                .finish_non_exhaustive(),
        }
    }
}

impl From<&str> for KeySource {
    fn from(key: &str) -> Self {
        KeySource::Literal(key.to_string())
    }
}

impl From<String> for KeySource {
    fn from(key: String) -> Self {
        KeySource::Literal(key)
    }
}

impl From<Signal<String>> for KeySource {
    fn from(signal: Signal<String>) -> Self {
        KeySource::Signal(signal)
    }
}

impl From<&Signal<String>> for KeySource {
    fn from(signal: &Signal<String>) -> Self {
        KeySource::Signal(signal.clone())
    }
}
