//! Tumbling window assignment
//!
//! Windows are half-open `[start, end)` and aligned to the epoch with floor
//! division, so the same timestamp maps to the same window on every run.

use crate::errors::ConfigError;
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open time window `[start_ms, end_ms)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Window {
    /// Inclusive start (ms)
    pub start_ms: i64,
    /// Exclusive end (ms)
    pub end_ms: i64,
}

impl Window {
    /// Whether `timestamp_ms` falls inside this window
    #[must_use]
    pub const fn contains(&self, timestamp_ms: i64) -> bool {
        self.start_ms <= timestamp_ms && timestamp_ms < self.end_ms
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (
            DateTime::from_timestamp_millis(self.start_ms),
            DateTime::from_timestamp_millis(self.end_ms),
        ) {
            (Some(start), Some(end)) => write!(f, "[{}, {})", start.to_rfc3339(), end.to_rfc3339()),
            _ => write!(f, "[{}, {})", self.start_ms, self.end_ms),
        }
    }
}

/// Map a timestamp to its tumbling window.
///
/// `duration_ms` must be positive; [`WindowAssigner`] guarantees this for
/// callers that go through configuration. Total over `i64`: at the extreme
/// edges of the range, where the aligned window is not representable, the
/// bounds saturate. Use [`checked_assign`] to reject those timestamps.
#[must_use]
pub fn assign(timestamp_ms: i64, duration_ms: i64) -> Window {
    debug_assert!(duration_ms > 0, "window duration must be positive");
    let start_ms = timestamp_ms.saturating_sub(timestamp_ms.rem_euclid(duration_ms));
    Window {
        start_ms,
        end_ms: start_ms.saturating_add(duration_ms),
    }
}

/// Like [`assign`], but `None` when the aligned window does not fit in `i64`
#[must_use]
pub fn checked_assign(timestamp_ms: i64, duration_ms: i64) -> Option<Window> {
    if duration_ms <= 0 {
        return None;
    }
    let start_ms = timestamp_ms.checked_sub(timestamp_ms.rem_euclid(duration_ms))?;
    let end_ms = start_ms.checked_add(duration_ms)?;
    Some(Window { start_ms, end_ms })
}

/// Window assigner bound to a validated duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAssigner {
    duration_ms: i64,
}

impl WindowAssigner {
    /// Create an assigner for windows of `candle_seconds`
    pub fn new(candle_seconds: u64) -> Result<Self, ConfigError> {
        let duration_ms = i64::try_from(candle_seconds)
            .ok()
            .and_then(|secs| secs.checked_mul(1000))
            .filter(|ms| *ms > 0)
            .ok_or(ConfigError::NonPositiveDuration(candle_seconds))?;
        Ok(Self { duration_ms })
    }

    /// Window duration in milliseconds
    #[must_use]
    pub const fn duration_ms(&self) -> i64 {
        self.duration_ms
    }

    /// Window containing `timestamp_ms`
    #[must_use]
    pub fn assign(&self, timestamp_ms: i64) -> Window {
        assign(timestamp_ms, self.duration_ms)
    }

    /// Window containing `timestamp_ms`, if it is representable
    #[must_use]
    pub fn checked_assign(&self, timestamp_ms: i64) -> Option<Window> {
        checked_assign(timestamp_ms, self.duration_ms)
    }
}
