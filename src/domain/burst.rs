//! Burst tracking for loop detection.
//!
//! A loop shows up as the same identity calling again and again with gaps
//! shorter than a "fast" threshold, long before any hourly ceiling is reached.

use super::time::Timestamp;
use std::time::Duration;

/// Verdict on a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstDecision {
    /// The call is within normal cadence
    Normal,
    /// Too many consecutive fast calls
    LoopDetected {
        /// Length of the current run of fast calls, including this one
        consecutive_calls: u32,
    },
}

impl BurstDecision {
    /// Check if this decision flags a loop.
    pub fn is_loop(&self) -> bool {
        matches!(self, BurstDecision::LoopDetected { .. })
    }
}

/// Per-identity call cadence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BurstState {
    last_call_at: Option<Timestamp>,
    consecutive_fast_calls: u32,
}

impl BurstState {
    /// State for an identity that has not called yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Time of the most recent call.
    pub fn last_call_at(&self) -> Option<Timestamp> {
        self.last_call_at
    }

    /// Length of the current run of fast calls.
    pub fn consecutive_fast_calls(&self) -> u32 {
        self.consecutive_fast_calls
    }

    /// Register a call at `now`.
    ///
    /// A call arriving less than `fast_threshold` after the previous one
    /// extends the run; any slower call starts a new run of 1. The run
    /// exceeding `max_calls` is a loop. `last_call_at` moves to `now` whatever
    /// the verdict.
    pub fn register_call(
        &mut self,
        now: Timestamp,
        fast_threshold: Duration,
        max_calls: u32,
    ) -> BurstDecision {
        let is_fast = self
            .last_call_at
            .is_some_and(|last| now.saturating_duration_since(last) < fast_threshold);

        self.consecutive_fast_calls = if is_fast {
            self.consecutive_fast_calls.saturating_add(1)
        } else {
            1
        };
        self.last_call_at = Some(now);

        if self.consecutive_fast_calls > max_calls {
            BurstDecision::LoopDetected {
                consecutive_calls: self.consecutive_fast_calls,
            }
        } else {
            BurstDecision::Normal
        }
    }

    /// Whether a call at `now` would start a fresh run anyway.
    ///
    /// Such state carries no information and can be dropped.
    pub fn is_idle(&self, now: Timestamp, fast_threshold: Duration) -> bool {
        match self.last_call_at {
            Some(last) => now.saturating_duration_since(last) >= fast_threshold,
            None => true,
        }
    }
}
