//! Eviction policy adapters for the outcome cache.

use crate::application::ports::{EvictionCandidate, EvictionPolicy};

/// Bulk least-recently-accessed eviction.
///
/// Once the cache holds more than `max_entries`, the oldest `fraction` of it
/// is removed in one pass, and never less than enough to bring it down to
/// `max_entries - ceil(max_entries * fraction)`.
#[derive(Debug, Clone)]
pub struct OldestFractionEviction {
    max_entries: usize,
    fraction: f64,
}

impl OldestFractionEviction {
    /// Create a policy for a cache of `max_entries`, removing `fraction` of
    /// it per pass.
    ///
    /// `fraction` is clamped to (0, 1].
    pub fn new(max_entries: usize, fraction: f64) -> Self {
        let fraction = if fraction.is_finite() && fraction > 0.0 {
            fraction.min(1.0)
        } else {
            1.0
        };
        Self {
            max_entries,
            fraction,
        }
    }

    /// Size limit that triggers eviction.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Largest size left behind by an eviction pass.
    pub fn target_size(&self) -> usize {
        let headroom = (self.max_entries as f64 * self.fraction).ceil() as usize;
        self.max_entries.saturating_sub(headroom)
    }

    fn over_limit(&self, current_entries: usize) -> bool {
        current_entries > self.max_entries
    }

    fn victim_count(&self, current_entries: usize) -> usize {
        let by_fraction = (current_entries as f64 * self.fraction).ceil() as usize;
        let to_target = current_entries.saturating_sub(self.target_size());
        by_fraction.max(to_target).min(current_entries)
    }
}

impl<K> EvictionPolicy<K> for OldestFractionEviction
where
    K: Clone,
{
    fn should_evict(&self, current_entries: usize) -> bool {
        self.over_limit(current_entries)
    }

    fn select_victims(&self, candidates: &mut [EvictionCandidate<K>]) -> Vec<K> {
        if !self.over_limit(candidates.len()) {
            return Vec::new();
        }

        let count = self.victim_count(candidates.len());
        candidates.sort_by_key(|candidate| candidate.last_access);
        candidates[..count]
            .iter()
            .map(|candidate| candidate.key.clone())
            .collect()
    }
}
