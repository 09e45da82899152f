//! Staleness-triggered background refresh.
//!
//! Every trigger funnels into [`SessionCore::revalidate_if_stale`]: read the
//! stored entry's timestamp, and only if it is past the session's staleness
//! window start a background fetch. A fresh or missing entry is a no-op.

use serde::de::DeserializeOwned;

use crate::freshness;
use crate::session::{FetchKind, SessionCore};
use crate::utils::now_ms;

/// What asked for a staleness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
    /// The host finished hydrating.
    Hydration,
    /// The host regained focus.
    Focus,
    /// The session moved to a key that was already cached.
    KeyChange,
}

impl Trigger {
    fn as_str(self) -> &'static str {
        match self {
            Trigger::Hydration => "hydration",
            Trigger::Focus => "focus",
            Trigger::KeyChange => "key_change",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Staleness {
    Missing,
    Fresh,
    Stale,
}

pub(crate) fn staleness(timestamp: Option<i64>, stale_ms: i64, now: i64) -> Staleness {
    match timestamp {
        None => Staleness::Missing,
        Some(ts) if freshness::is_fresh_at(ts, stale_ms, now) => Staleness::Fresh,
        Some(_) => Staleness::Stale,
    }
}

impl<T> SessionCore<T>
where
    T: Clone + Send + Sync + DeserializeOwned + 'static,
{
    /// Refresh `key` in the background if its stored entry is stale.
    ///
    /// Returns whether a refresh ran.
    pub(crate) async fn revalidate_if_stale(&self, key: &str, trigger: Trigger) -> bool {
        let timestamp = self.ctx().entry_timestamp(key).await;
        match staleness(timestamp, self.stale_ms(), now_ms()) {
            Staleness::Missing | Staleness::Fresh => {
                tracing::trace!(key, trigger = trigger.as_str(), ?timestamp, "no revalidation needed");
                false
            }
            Staleness::Stale => {
                tracing::debug!(key, trigger = trigger.as_str(), ?timestamp, "entry stale; revalidating");
                self.fetch(key, FetchKind::Background).await;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_entry_is_not_stale() {
        assert_eq!(staleness(None, 50, 1_000), Staleness::Missing);
    }

    #[test]
    fn test_staleness_window() {
        assert_eq!(staleness(Some(1_000), 50, 1_049), Staleness::Fresh);
        assert_eq!(staleness(Some(1_000), 50, 1_050), Staleness::Stale);
        assert_eq!(staleness(Some(1_000), 50, 1_150), Staleness::Stale);
    }

    #[test]
    fn test_future_timestamp_counts_as_fresh() {
        assert_eq!(staleness(Some(5_000), 50, 1_000), Staleness::Fresh);
    }

    #[test]
    fn test_trigger_names() {
        assert_eq!(Trigger::Focus.as_str(), "focus");
        assert_eq!(Trigger::KeyChange.as_str(), "key_change");
    }
}
