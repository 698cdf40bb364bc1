//! Per-identity detection of runaway call loops.

use crate::application::ports::Storage;
use crate::domain::burst::{BurstDecision, BurstState};
use crate::domain::time::Timestamp;
use std::time::Duration;

/// Flags identities issuing abnormally rapid repeated calls.
///
/// A call counts as fast when it arrives less than `fast_threshold` after the
/// previous call from the same identity. More than `max_calls` fast calls in
/// a row is treated as a loop.
#[derive(Debug, Clone)]
pub struct LoopGuard<S>
where
    S: Storage<String, BurstState> + Clone,
{
    states: S,
    fast_threshold: Duration,
    max_calls: u32,
}

impl<S> LoopGuard<S>
where
    S: Storage<String, BurstState> + Clone,
{
    /// Create a loop guard.
    pub fn new(states: S, fast_threshold: Duration, max_calls: u32) -> Self {
        Self {
            states,
            fast_threshold,
            max_calls,
        }
    }

    /// Register a call from `identity` at `now` and judge it.
    pub fn check(&self, identity: &str, now: Timestamp) -> BurstDecision {
        let fast_threshold = self.fast_threshold;
        let max_calls = self.max_calls;
        self.states
            .with_entry_mut(identity.to_string(), BurstState::new, |state| {
                state.register_call(now, fast_threshold, max_calls)
            })
    }

    /// Drop states whose next call would start a new run anyway.
    ///
    /// Returns the number of states removed.
    pub fn sweep(&self, now: Timestamp) -> usize {
        let before = self.states.len();
        let fast_threshold = self.fast_threshold;
        self.states
            .retain(|_, state| !state.is_idle(now, fast_threshold));
        before.saturating_sub(self.states.len())
    }

    /// Number of identities with burst state.
    pub fn tracked_identities(&self) -> usize {
        self.states.len()
    }
}
