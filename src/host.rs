//! Signals the hosting environment emits: hydration completion and focus.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

/// One-shot "initial render settled" signal.
#[derive(Debug, Clone)]
pub struct Hydration {
    done: Arc<watch::Sender<bool>>,
}

impl Hydration {
    /// A hydration pass that is still running. Call [`Hydration::complete`] once it settles.
    pub fn pending() -> Self {
        let (done, _) = watch::channel(false);
        Hydration {
            done: Arc::new(done),
        }
    }

    /// A host that has already finished hydrating.
    pub fn completed() -> Self {
        let (done, _) = watch::channel(true);
        Hydration {
            done: Arc::new(done),
        }
    }

    /// Mark hydration as complete. Later calls are no-ops.
    pub fn complete(&self) {
        self.done.send_if_modified(|done| !std::mem::replace(done, true));
    }

    /// Whether the initial hydration pass is still running.
    pub fn is_hydrating(&self) -> bool {
        !*self.done.borrow()
    }

    /// Resolve once hydration is complete; immediately if it already is.
    pub async fn wait(&self) {
        let mut rx = self.done.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|done| *done).await;
    }
}

impl Default for Hydration {
    fn default() -> Self {
        Hydration::completed()
    }
}

/// Repeatable "application regained focus" signal.
#[derive(Debug, Clone)]
pub struct FocusEvents {
    tx: broadcast::Sender<()>,
}

impl FocusEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        FocusEvents { tx }
    }

    /// Report that focus was regained.
    pub fn notify(&self) {
        // No listeners is fine.
        let _ = self.tx.send(());
    }

    /// Register a listener. It is deregistered when dropped.
    pub fn subscribe(&self) -> FocusListener {
        FocusListener {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for FocusEvents {
    fn default() -> Self {
        FocusEvents::new()
    }
}

/// A single registration on [`FocusEvents`].
#[derive(Debug)]
pub struct FocusListener {
    rx: broadcast::Receiver<()>,
}

impl FocusListener {
    /// Wait for the next focus event. Bursts that overflowed the channel count as one.
    pub async fn next(&mut self) {
        match self.rx.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}
