//! Explicit reactive inputs.
//!
//! A [`Signal`] is a shared value whose writes bump a version counter. Anything
//! that needs to react to it holds a [`WatchSource`], which resolves once per
//! observed change. Sessions subscribe to the signals that produce their key and
//! to any extra sources passed in their options.

use std::future::pending;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

struct SignalInner<T> {
    value: RwLock<T>,
    version: watch::Sender<u64>,
}

/// A shared, observable value.
pub struct Signal<T> {
    inner: Arc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Signal {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Signal<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = self.inner.value.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Signal")
            .field("value", &*value)
            .field("version", &*self.inner.version.borrow())
            .finish()
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        let (version, _) = watch::channel(0);
        Signal {
            inner: Arc::new(SignalInner {
                value: RwLock::new(value),
                version,
            }),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.inner
            .value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the value and notify every watcher.
    pub fn set(&self, value: T) {
        self.update(|current| *current = value);
    }

    /// Modify the value in place and notify every watcher.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        {
            let mut current = self
                .inner
                .value
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            f(&mut current);
        }
        self.inner.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Number of writes so far.
    pub fn version(&self) -> u64 {
        *self.inner.version.borrow()
    }

    /// A change notification stream starting at the current version.
    pub fn watch(&self) -> WatchSource {
        WatchSource {
            rx: self.inner.version.subscribe(),
        }
    }

    /// A setter that only applies the last value written within `delay`.
    pub fn debounced(&self, delay: Duration) -> Debouncer<T> {
        Debouncer {
            signal: self.clone(),
            delay,
            pending: None,
        }
    }
}

/// Resolves whenever the signal it came from is written.
#[derive(Debug)]
pub struct WatchSource {
    rx: watch::Receiver<u64>,
}

impl Clone for WatchSource {
    fn clone(&self) -> Self {
        WatchSource {
            rx: self.rx.clone(),
        }
    }
}

impl WatchSource {
    /// Wait for the next write.
    ///
    /// Once every handle to the signal is gone this never resolves again.
    pub async fn changed(&mut self) {
        if self.rx.changed().await.is_err() {
            pending::<()>().await;
        }
    }

    /// Whether a write happened since the last `changed()`.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}

/// Wait until any of `sources` changes. Never resolves for an empty list.
pub(crate) async fn any_changed(sources: &mut [WatchSource]) {
    if sources.is_empty() {
        return pending().await;
    }
    let changes = sources.iter_mut().map(|s| Box::pin(s.changed()));
    futures::future::select_all(changes).await;
}

/// Delays writes to a signal until no newer write arrives within `delay`.
///
/// Dropping the debouncer discards a write that has not landed yet.
pub struct Debouncer<T> {
    signal: Signal<T>,
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl<T> Debouncer<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Schedule `value`, replacing any write still waiting.
    pub fn set(&mut self, value: T) {
        self.cancel();
        let signal = self.signal.clone();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            signal.set(value);
        }));
    }

    /// Drop a write that has not landed yet.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
