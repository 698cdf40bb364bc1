//! Cached outcome entries.

use super::outcome::OperationOutcome;
use super::time::Timestamp;
use std::time::Duration;

/// A cached outcome and its access history.
///
/// The payload is only ever replaced wholesale; reads touch the access
/// bookkeeping and nothing else.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// The cached outcome, success or failure
    pub payload: OperationOutcome,
    /// When the outcome was stored
    pub created_at: Timestamp,
    /// Last time the entry was written or served
    pub last_access_at: Timestamp,
    /// Number of writes and hits
    pub access_count: u64,
}

impl CacheEntry {
    /// Create a fresh entry for `payload` stored at `now`.
    pub fn new(payload: OperationOutcome, now: Timestamp) -> Self {
        Self {
            payload,
            created_at: now,
            last_access_at: now,
            access_count: 1,
        }
    }

    /// Entry copied in from elsewhere at `now`, aged from `stored_at`.
    ///
    /// Freshness counts from `stored_at`; recency for eviction counts from
    /// `now`.
    pub fn warmed(payload: OperationOutcome, stored_at: Timestamp, now: Timestamp) -> Self {
        Self {
            payload,
            created_at: stored_at,
            last_access_at: now,
            access_count: 1,
        }
    }

    /// Whether the entry is still fresh at `now` under `ttl`.
    pub fn is_fresh(&self, now: Timestamp, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) < ttl
    }

    /// Record a hit at `now`.
    pub fn touch(&mut self, now: Timestamp) {
        self.last_access_at = now;
        self.access_count = self.access_count.saturating_add(1);
    }
}
