//! Status projection.
//!
//! A session tracks the raw state of its latest fetch. Callers only ever see
//! the projected view, in which a background refresh is indistinguishable from
//! settled data until new data arrives.

use serde::Serialize;

use crate::error::CacheError;

/// Public lifecycle of a call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Idle,
    Pending,
    Success,
    Error,
}

/// Raw per-session state, before projection.
#[derive(Debug, Clone)]
pub(crate) struct SessionState<T> {
    pub(crate) key: String,
    pub(crate) data: Option<T>,
    pub(crate) error: Option<CacheError>,
    pub(crate) status: Status,
    /// True only while a staleness-triggered refresh is in flight.
    pub(crate) is_background_refresh: bool,
}

impl<T> SessionState<T> {
    pub(crate) fn new(key: String) -> Self {
        SessionState {
            key,
            data: None,
            error: None,
            status: Status::Idle,
            is_background_refresh: false,
        }
    }
}

/// What a caller observes.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot<T> {
    pub key: String,
    pub data: Option<T>,
    pub pending: bool,
    pub error: Option<CacheError>,
    pub status: Status,
}

/// `pending` hides a background refresh.
pub fn project_pending(is_background_refresh: bool, underlying: Status) -> bool {
    !is_background_refresh && underlying == Status::Pending
}

/// A background refresh reads as `Success` while it is in flight.
pub fn project_status(is_background_refresh: bool, underlying: Status) -> Status {
    match underlying {
        Status::Pending if is_background_refresh => Status::Success,
        other => other,
    }
}

pub(crate) fn project<T: Clone>(state: &SessionState<T>) -> Snapshot<T> {
    Snapshot {
        key: state.key.clone(),
        data: state.data.clone(),
        pending: project_pending(state.is_background_refresh, state.status),
        error: state.error.clone(),
        status: project_status(state.is_background_refresh, state.status),
    }
}
