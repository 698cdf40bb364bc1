//! Hour-bucket rate windows.
//!
//! Call volume is counted in fixed buckets keyed by the hour index
//! `floor(now_ms / 3_600_000)`. A window only ever counts upwards; when the
//! hour rolls over the old window is abandoned and a fresh one takes its place
//! on the next increment.

use super::time::Timestamp;
use std::time::Duration;

/// Length of one rate bucket.
pub const HOUR: Duration = Duration::from_secs(3600);

const HOUR_MS: u64 = 3_600_000;

/// Hour bucket index for a timestamp.
pub fn hour_index(now: Timestamp) -> u64 {
    now.as_millis() / HOUR_MS
}

/// Which ceiling a call ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitScope {
    /// The per-identity hourly ceiling
    Identity,
    /// The instance-wide hourly ceiling
    Global,
}

impl LimitScope {
    /// Machine-readable scope name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitScope::Identity => "identity",
            LimitScope::Global => "global",
        }
    }
}

/// Call counter for one hour bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    hour: u64,
    count: u64,
    reset_at: Timestamp,
}

impl RateWindow {
    /// Open an empty window for the bucket containing `now`.
    ///
    /// `reset_at` is the end of that bucket, so it is never more than one
    /// hour after `now`.
    pub fn open(now: Timestamp) -> Self {
        let hour = hour_index(now);
        Self {
            hour,
            count: 0,
            reset_at: Timestamp::from_millis(hour.saturating_add(1).saturating_mul(HOUR_MS)),
        }
    }

    /// The bucket's hour index.
    pub fn hour(&self) -> u64 {
        self.hour
    }

    /// Calls counted in this bucket.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// When the bucket stops being current.
    pub fn reset_at(&self) -> Timestamp {
        self.reset_at
    }

    /// Whether `now` still falls in this bucket.
    pub fn is_current(&self, now: Timestamp) -> bool {
        hour_index(now) == self.hour
    }

    /// Calls counted in the bucket containing `now`.
    ///
    /// A stale window counts as empty; it is never reset in place by a read.
    pub fn count_at(&self, now: Timestamp) -> u64 {
        if self.is_current(now) {
            self.count
        } else {
            0
        }
    }

    /// Whether one more call fits under `limit` at `now`.
    pub fn has_capacity(&self, limit: u64, now: Timestamp) -> bool {
        self.count_at(now) < limit
    }

    /// Count one call at `now`, rolling over to a fresh bucket if the hour
    /// has changed.
    pub fn increment(&mut self, now: Timestamp) {
        if !self.is_current(now) {
            *self = RateWindow::open(now);
        }
        self.count = self.count.saturating_add(1);
    }

    /// Time until the bucket containing `now` resets.
    pub fn retry_after(&self, now: Timestamp) -> Duration {
        if self.is_current(now) {
            self.reset_at.saturating_duration_since(now)
        } else {
            Duration::ZERO
        }
    }
}
