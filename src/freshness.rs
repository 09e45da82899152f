//! Freshness policy: decides whether a cached timestamp is still fresh.

use std::time::Duration;

use crate::utils::now_ms;

/// Staleness window used when a caller does not pick one.
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(120);

/// Whether an entry produced at `timestamp` is still fresh right now.
pub fn is_fresh(timestamp: i64, stale_time_ms: i64) -> bool {
    is_fresh_at(timestamp, stale_time_ms, now_ms())
}

/// Whether an entry produced at `timestamp` is fresh at `now_ms`.
///
/// A timestamp in the future yields a negative age and counts as fresh.
pub fn is_fresh_at(timestamp: i64, stale_time_ms: i64, now_ms: i64) -> bool {
    now_ms.saturating_sub(timestamp) < stale_time_ms
}

/// Milliseconds in a staleness window, saturated to `i64`.
pub fn window_ms(stale_time: Duration) -> i64 {
    i64::try_from(stale_time.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_window_is_two_minutes() {
        assert_eq!(window_ms(DEFAULT_STALE_TIME), 120_000);
    }

    #[test]
    fn test_fresh_inside_window() {
        assert!(is_fresh_at(1_000, 50, 1_049));
    }

    #[test]
    fn test_stale_at_window_boundary() {
        assert!(!is_fresh_at(1_000, 50, 1_050));
        assert!(!is_fresh_at(1_000, 50, 1_150));
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        assert!(is_fresh_at(10_000, 50, 1_000));
    }

    #[test]
    fn test_zero_window_is_always_stale() {
        assert!(!is_fresh_at(1_000, 0, 1_000));
    }

    #[test]
    fn test_is_fresh_uses_wall_clock() {
        assert!(is_fresh(now_ms(), 60_000));
        assert!(!is_fresh(now_ms() - 10_000, 5_000));
    }
}
