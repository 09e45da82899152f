use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::freshness::{self, DEFAULT_STALE_TIME};
use crate::signal::WatchSource;

/// Context-wide defaults, loadable from any serde format.
///
/// ```ignore
/// let config: SwrConfig = serde_json::from_str(r#"{"stale_time": "30s"}"#)?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwrConfig {
    /// Age after which an entry is revalidated in the background.
    #[serde(with = "humantime_serde")]
    pub stale_time: Duration,
    /// Fetch as soon as a session starts.
    pub immediate: bool,
    /// Ignore cached values during the initial hydration pass.
    pub revalidate_on_mount: bool,
    /// Revalidate stale entries when the host regains focus.
    pub revalidate_on_focus: bool,
}

impl Default for SwrConfig {
    fn default() -> Self {
        SwrConfig {
            stale_time: DEFAULT_STALE_TIME,
            immediate: true,
            revalidate_on_mount: false,
            revalidate_on_focus: false,
        }
    }
}

/// Per call site options.
#[derive(Debug, Clone)]
pub struct SwrOptions {
    pub(crate) watch: Vec<WatchSource>,
    pub(crate) immediate: bool,
    pub(crate) run_on_server: bool,
    pub(crate) stale_time: Duration,
    pub(crate) revalidate_on_mount: bool,
    pub(crate) revalidate_on_focus: bool,
}

impl Default for SwrOptions {
    fn default() -> Self {
        SwrOptions::from(&SwrConfig::default())
    }
}

impl From<&SwrConfig> for SwrOptions {
    fn from(config: &SwrConfig) -> Self {
        SwrOptions {
            watch: Vec::new(),
            immediate: config.immediate,
            run_on_server: true,
            stale_time: config.stale_time,
            revalidate_on_mount: config.revalidate_on_mount,
            revalidate_on_focus: config.revalidate_on_focus,
        }
    }
}

impl SwrOptions {
    /// Refetch whenever `source` changes.
    pub fn watch(mut self, source: WatchSource) -> Self {
        self.watch.push(source);
        self
    }

    /// If false, nothing is fetched until `refresh()` is called.
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Kept for hosts that render on a server; a client-side session ignores it.
    pub fn run_on_server(mut self, run_on_server: bool) -> Self {
        self.run_on_server = run_on_server;
        self
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Shorthand for `stale_time(Duration::from_millis(ms))`.
    pub fn stale_time_ms(self, ms: u64) -> Self {
        self.stale_time(Duration::from_millis(ms))
    }

    pub fn revalidate_on_mount(mut self, revalidate: bool) -> Self {
        self.revalidate_on_mount = revalidate;
        self
    }

    pub fn revalidate_on_focus(mut self, revalidate: bool) -> Self {
        self.revalidate_on_focus = revalidate;
        self
    }

    pub fn is_immediate(&self) -> bool {
        self.immediate
    }

    pub fn runs_on_server(&self) -> bool {
        self.run_on_server
    }

    pub(crate) fn stale_window_ms(&self) -> i64 {
        freshness::window_ms(self.stale_time)
    }
}
