//! Per call site sessions.
//!
//! A session owns the raw state of one call site and a driver task that reacts
//! to the call site's inputs: key changes, watch sources, hydration and focus.
//! Fetches run through the context's coordinator, so their store writes land
//! even after the session is gone; only the session's own state update is
//! skipped once it has been deactivated or has moved on to another key.

use serde::de::DeserializeOwned;
use std::future::pending;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::context::SwrContext;
use crate::coordinator::{Computation, Loader};
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::host::FocusListener;
use crate::key::KeySource;
use crate::options::SwrOptions;
use crate::revalidate::Trigger;
use crate::signal::{WatchSource, any_changed};
use crate::status::{SessionState, Snapshot, Status, project};

/// How a fetch should present itself on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchKind {
    /// Visible: `pending` is true until it settles.
    Foreground,
    /// Staleness-triggered: hidden behind the cached data.
    Background,
    /// Evict, then fetch in the foreground.
    Invalidate,
}

pub(crate) struct SessionCore<T> {
    ctx: SwrContext,
    loader: Loader,
    key_source: KeySource,
    stale_ms: i64,
    state: watch::Sender<SessionState<T>>,
    cancel: CancellationToken,
}

impl<T> SessionCore<T>
where
    T: Clone + Send + Sync + DeserializeOwned + 'static,
{
    pub(crate) fn ctx(&self) -> &SwrContext {
        &self.ctx
    }

    pub(crate) fn stale_ms(&self) -> i64 {
        self.stale_ms
    }

    pub(crate) fn current_key(&self) -> String {
        self.state.borrow().key.clone()
    }

    fn is_current(&self, key: &str) -> bool {
        self.state.borrow().key == key
    }

    /// Mark the session pending and start (or join) the computation for `key`.
    ///
    /// Returns `None` once the session is deactivated or has moved to another key.
    fn begin(&self, key: &str, kind: FetchKind) -> Option<Computation> {
        if self.cancel.is_cancelled() || !self.is_current(key) {
            return None;
        }

        self.state.send_if_modified(|s| {
            match kind {
                // A foreground fetch already in flight stays visible.
                FetchKind::Background if s.status == Status::Pending && !s.is_background_refresh => {
                    return false;
                }
                FetchKind::Background => s.is_background_refresh = true,
                FetchKind::Foreground | FetchKind::Invalidate => s.is_background_refresh = false,
            }
            s.status = Status::Pending;
            true
        });

        let coordinator = self.ctx.coordinator();
        Some(match kind {
            FetchKind::Invalidate => coordinator.invalidate(key, &self.loader),
            FetchKind::Foreground | FetchKind::Background => coordinator.fetch(key, &self.loader),
        })
    }

    async fn settle(&self, key: &str, computation: Computation) {
        let result = computation
            .await
            .and_then(|stored| stored.into_typed::<T>());
        self.apply(key, result);
    }

    /// Run one fetch for `key` and fold its outcome into the session state.
    pub(crate) async fn fetch(&self, key: &str, kind: FetchKind) {
        if let Some(computation) = self.begin(key, kind) {
            self.settle(key, computation).await;
        }
    }

    fn apply(&self, key: &str, result: Result<CacheEntry<T>, CacheError>) {
        if self.cancel.is_cancelled() {
            tracing::debug!(key, "session deactivated; result only kept in store");
            return;
        }

        self.state.send_if_modified(|s| {
            if s.key != key {
                return false;
            }
            s.is_background_refresh = false;
            match result {
                Ok(entry) => {
                    s.data = Some(entry.data);
                    s.error = None;
                    s.status = Status::Success;
                }
                Err(e) => {
                    tracing::debug!(key, error = %e, "fetch failed; keeping previous data");
                    s.error = Some(e);
                    s.status = Status::Error;
                }
            }
            true
        });
    }

    /// Cache-first load: show a stored entry, fetch only on a miss.
    async fn load(&self, key: &str) {
        let Some(entry) = self.ctx.lookup::<T>(key).await else {
            self.fetch(key, FetchKind::Foreground).await;
            return;
        };

        let shown = self.state.send_if_modified(|s| {
            if s.key != key {
                return false;
            }
            s.data = Some(entry.data);
            s.status = Status::Success;
            true
        });
        if shown {
            self.revalidate_if_stale(key, Trigger::KeyChange).await;
        }
    }

    fn spawn_fetch(self: &Arc<Self>, key: String, kind: FetchKind) {
        if let Some(computation) = self.begin(&key, kind) {
            let core = Arc::clone(self);
            tokio::spawn(async move { core.settle(&key, computation).await });
        }
    }

    fn spawn_revalidate(self: &Arc<Self>, trigger: Trigger) {
        let core = Arc::clone(self);
        tokio::spawn(async move {
            let key = core.current_key();
            core.revalidate_if_stale(&key, trigger).await;
        });
    }

    fn switch_key(self: &Arc<Self>, key: String) {
        tracing::debug!(from = %self.current_key(), to = %key, "session key changed");
        self.state.send_modify(|s| *s = SessionState::new(key.clone()));
        let core = Arc::clone(self);
        tokio::spawn(async move { core.load(&key).await });
    }

    fn on_key_inputs_changed(self: &Arc<Self>) {
        let key = self.key_source.resolve();
        if self.is_current(&key) {
            tracing::trace!(key = %key, "key inputs changed, key did not");
            return;
        }
        self.switch_key(key);
    }

    fn on_watch_changed(self: &Arc<Self>) {
        let key = self.key_source.resolve();
        if self.is_current(&key) {
            tracing::debug!(key = %key, "watch source changed; refetching");
            self.spawn_fetch(key, FetchKind::Foreground);
        } else {
            self.switch_key(key);
        }
    }
}

struct DriverInputs {
    check_hydration: bool,
    key_sources: Vec<WatchSource>,
    watch_sources: Vec<WatchSource>,
    focus: Option<FocusListener>,
}

async fn next_focus(listener: &mut Option<FocusListener>) {
    match listener {
        Some(listener) => listener.next().await,
        None => pending().await,
    }
}

async fn drive<T>(core: Arc<SessionCore<T>>, mut inputs: DriverInputs)
where
    T: Clone + Send + Sync + DeserializeOwned + 'static,
{
    let cancel = core.cancel.clone();
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = event_loop(&core, &mut inputs) => {}
    }
    tracing::debug!(key = %core.current_key(), "session deactivated");
    // Dropping `inputs` releases the focus registration.
}

async fn event_loop<T>(core: &Arc<SessionCore<T>>, inputs: &mut DriverInputs)
where
    T: Clone + Send + Sync + DeserializeOwned + 'static,
{
    let mut hydration_checked = !inputs.check_hydration;
    loop {
        tokio::select! {
            _ = core.ctx.hydration().wait(), if !hydration_checked => {
                hydration_checked = true;
                core.spawn_revalidate(Trigger::Hydration);
            }
            _ = any_changed(&mut inputs.key_sources) => core.on_key_inputs_changed(),
            _ = any_changed(&mut inputs.watch_sources) => core.on_watch_changed(),
            _ = next_focus(&mut inputs.focus) => core.spawn_revalidate(Trigger::Focus),
        }
    }
}

/// Activate a call site.
pub(crate) async fn start<T>(
    ctx: SwrContext,
    key_source: KeySource,
    loader: Loader,
    options: SwrOptions,
) -> Result<SwrHandle<T>, CacheError>
where
    T: Clone + Send + Sync + DeserializeOwned + 'static,
{
    let key = key_source.resolve();
    let mut state = SessionState::new(key.clone());

    let skip_cache = options.revalidate_on_mount && ctx.hydration().is_hydrating();
    let cached = if skip_cache {
        tracing::debug!(key = %key, "hydrating; not trusting cached value");
        None
    } else {
        ctx.lookup::<T>(&key).await
    };

    let initial_fetch = match cached {
        Some(entry) => {
            state.data = Some(entry.data);
            state.status = Status::Success;
            false
        }
        None => options.immediate,
    };
    if initial_fetch {
        state.status = Status::Pending;
    }
    tracing::debug!(key = %key, status = ?state.status, "session started");

    let (state, _) = watch::channel(state);
    let cancel = CancellationToken::new();
    let core = Arc::new(SessionCore {
        stale_ms: options.stale_window_ms(),
        ctx: ctx.clone(),
        loader,
        key_source,
        state,
        cancel: cancel.clone(),
    });

    if initial_fetch {
        core.spawn_fetch(key, FetchKind::Foreground);
    }

    let inputs = DriverInputs {
        check_hydration: options.immediate,
        key_sources: core.key_source.sources(),
        watch_sources: options.watch,
        focus: options
            .revalidate_on_focus
            .then(|| ctx.focus().subscribe()),
    };
    let driver = tokio::spawn(drive(Arc::clone(&core), inputs));

    Ok(SwrHandle {
        core,
        driver,
        _guard: cancel.drop_guard(),
    })
}

/// The caller's view of an active call site.
///
/// Dropping the handle deactivates the call site: its watches and focus
/// registration are released and in-flight fetches no longer touch it.
pub struct SwrHandle<T> {
    core: Arc<SessionCore<T>>,
    driver: JoinHandle<()>,
    _guard: DropGuard,
}

impl<T> std::fmt::Debug for SwrHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.core.state.borrow();
        f.debug_struct("SwrHandle")
            .field("key", &state.key)
            .field("status", &state.status)
            .field("is_background_refresh", &state.is_background_refresh)
            .finish_non_exhaustive()
    }
}

impl<T> SwrHandle<T>
where
    T: Clone + Send + Sync + DeserializeOwned + 'static,
{
    /// The resolved key the call site currently points at.
    pub fn key(&self) -> String {
        self.core.current_key()
    }

    /// The latest payload, or `None` before any success.
    pub fn data(&self) -> Option<T> {
        self.core.state.borrow().data.clone()
    }

    pub fn pending(&self) -> bool {
        self.snapshot().pending
    }

    /// Error of the latest attempt. Cleared by the next success.
    pub fn error(&self) -> Option<CacheError> {
        self.core.state.borrow().error.clone()
    }

    pub fn status(&self) -> Status {
        self.snapshot().status
    }

    pub fn snapshot(&self) -> Snapshot<T> {
        project(&self.core.state.borrow())
    }

    /// Wait until the projected state satisfies `predicate`.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&Snapshot<T>) -> bool) -> Snapshot<T> {
        let mut rx = self.core.state.subscribe();
        loop {
            let snapshot = project(&rx.borrow_and_update());
            if predicate(&snapshot) || rx.changed().await.is_err() {
                return snapshot;
            }
        }
    }

    /// Fetch again regardless of freshness. Joins a fetch already in flight for the key.
    pub async fn refresh(&self) {
        let key = self.key();
        self.core.fetch(&key, FetchKind::Foreground).await;
    }

    /// Remove the stored entry, then fetch.
    ///
    /// Once this resolves the store holds either the new entry or nothing.
    pub async fn invalidate(&self) {
        let key = self.key();
        self.core.fetch(&key, FetchKind::Invalidate).await;
    }

    /// Deactivate and wait for the driver to release its registrations.
    pub async fn deactivate(self) {
        let SwrHandle {
            core,
            driver,
            _guard: guard,
        } = self;
        drop(guard);
        if let Err(e) = driver.await {
            tracing::warn!(key = %core.current_key(), error = %e, "session driver failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::wrap_fetcher;
    use crate::entry::StorageMode;
    use crate::stores::memory::{HashMapStore, HashMapStoreConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn context() -> SwrContext {
        SwrContext::builder()
            .store(Arc::new(HashMapStore::new(HashMapStoreConfig::default())))
            .build()
            .unwrap()
    }

    fn counter(calls: Arc<AtomicUsize>) -> Loader {
        wrap_fetcher(
            move || {
                let calls = calls.clone();
                async move { Ok::<_, CacheError>(calls.fetch_add(1, Ordering::SeqCst) + 1) }
            },
            StorageMode::Typed,
        )
    }

    #[tokio::test]
    async fn test_miss_starts_pending_then_settles() {
        let ctx = context();
        let calls = Arc::new(AtomicUsize::new(0));
        let handle: SwrHandle<usize> = start(
            ctx,
            KeySource::from("k"),
            counter(calls.clone()),
            SwrOptions::default(),
        )
        .await
        .unwrap();

        assert!(handle.pending());
        assert_eq!(handle.status(), Status::Pending);

        let settled = handle.wait_for(|s| s.status == Status::Success).await;
        assert_eq!(settled.data, Some(1));
        assert!(!settled.pending);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_background_fetch_does_not_hide_foreground_pending() {
        let ctx = context();
        let slow = wrap_fetcher(
            || async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, CacheError>(1_usize)
            },
            StorageMode::Typed,
        );
        let handle: SwrHandle<usize> = start(
            ctx,
            KeySource::from("k"),
            slow,
            SwrOptions::default().immediate(false),
        )
        .await
        .unwrap();

        handle.core.state.send_modify(|s| s.status = Status::Pending);
        let core = Arc::clone(&handle.core);
        let background = tokio::spawn(async move { core.fetch("k", FetchKind::Background).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.pending());

        background.await.unwrap();
        assert_eq!(handle.status(), Status::Success);
    }

    #[tokio::test]
    async fn test_result_for_old_key_is_dropped() {
        let ctx = context();
        let calls = Arc::new(AtomicUsize::new(0));
        let handle: SwrHandle<usize> = start(
            ctx,
            KeySource::from("a"),
            counter(calls),
            SwrOptions::default().immediate(false),
        )
        .await
        .unwrap();

        handle.core.apply("b", Ok(CacheEntry::new(9, 0)));
        assert_eq!(handle.data(), None);
        assert_eq!(handle.status(), Status::Idle);
    }
}
