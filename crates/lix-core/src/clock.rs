//! Wall-clock source for change and commit timestamps.
//!
//! Timestamps are microseconds since the Unix epoch. Tests inject a
//! [`ManualClock`] to get deterministic ordering.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::model::Timestamp;

pub trait Clock: Send + Sync {
    /// Current time in microseconds since the epoch.
    fn now_us(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> Timestamp {
        Utc::now().timestamp_micros()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    #[must_use]
    pub const fn new(start_us: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(start_us),
        }
    }

    pub fn set(&self, now_us: Timestamp) {
        self.now.store(now_us, Ordering::SeqCst);
    }

    /// Move forward by `delta_us` and return the new time.
    pub fn advance(&self, delta_us: Timestamp) -> Timestamp {
        self.now.fetch_add(delta_us, Ordering::SeqCst) + delta_us
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_us(&self) -> Timestamp {
        (**self).now_us()
    }
}

/// Render a timestamp as RFC 3339 in UTC, or the raw number if out of range.
#[must_use]
pub fn format_us(ts: Timestamp) -> String {
    DateTime::<Utc>::from_timestamp_micros(ts).map_or_else(
        || ts.to_string(),
        |dt| dt.to_rfc3339_opts(SecondsFormat::Micros, true),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_on_demand() {
        let clock = ManualClock::new(100);
        assert_eq!(clock.now_us(), 100);
        assert_eq!(clock.advance(5), 105);
        clock.set(7);
        assert_eq!(clock.now_us(), 7);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_us() > 1_577_836_800_000_000);
    }

    #[test]
    fn format_us_renders_utc() {
        assert_eq!(format_us(0), "1970-01-01T00:00:00.000000Z");
    }
}
