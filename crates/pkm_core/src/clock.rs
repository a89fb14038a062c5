//! Wall-clock seam.

use chrono::{DateTime, Datelike, Utc};

/// Source of "now" for registration checks, timestamps and code years.
pub trait Clock: Send + Sync {
    fn now_epoch_ms(&self) -> i64;

    /// Calendar year (UTC) of `now_epoch_ms`.
    fn current_year(&self) -> i32 {
        DateTime::<Utc>::from_timestamp_millis(self.now_epoch_ms())
            .map_or(1970, |moment| moment.year())
    }
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_epoch_ms(&self) -> i64 {
        self.0
    }
}
