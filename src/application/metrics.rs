//! Observability metrics for admission decisions.
//!
//! Provides counters about gate behavior for monitoring and debugging.

use crate::domain::decision::{CacheSource, RejectReason};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking admission statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Calls admitted to run the operation
    proceeded: AtomicU64,
    /// Calls served from the in-process cache
    served_local: AtomicU64,
    /// Calls served from the durable store
    served_durable: AtomicU64,
    rejected_rate_limited: AtomicU64,
    rejected_sampled: AtomicU64,
    rejected_loop: AtomicU64,
    /// Cache entries removed by eviction
    cache_evictions: AtomicU64,
    /// Durable store reads or writes that failed (and failed open)
    store_failures: AtomicU64,
    /// Entries removed by housekeeping
    swept_entries: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_proceeded(&self) {
        self.inner.proceeded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_served(&self, source: CacheSource) {
        let counter = match source {
            CacheSource::Local => &self.inner.served_local,
            CacheSource::Durable => &self.inner.served_durable,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self, reason: RejectReason) {
        let counter = match reason {
            RejectReason::RateLimited => &self.inner.rejected_rate_limited,
            RejectReason::Sampled => &self.inner.rejected_sampled,
            RejectReason::LoopDetected => &self.inner.rejected_loop,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evictions(&self, count: usize) {
        self.inner
            .cache_evictions
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_store_failure(&self) {
        self.inner.store_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_swept(&self, count: usize) {
        self.inner
            .swept_entries
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Calls admitted to run the operation.
    pub fn proceeded(&self) -> u64 {
        self.inner.proceeded.load(Ordering::Relaxed)
    }

    /// Calls served from any cache.
    pub fn served_cached(&self) -> u64 {
        self.inner.served_local.load(Ordering::Relaxed)
            + self.inner.served_durable.load(Ordering::Relaxed)
    }

    /// Calls rejected for `reason`.
    pub fn rejected(&self, reason: RejectReason) -> u64 {
        match reason {
            RejectReason::RateLimited => self.inner.rejected_rate_limited.load(Ordering::Relaxed),
            RejectReason::Sampled => self.inner.rejected_sampled.load(Ordering::Relaxed),
            RejectReason::LoopDetected => self.inner.rejected_loop.load(Ordering::Relaxed),
        }
    }

    /// Durable store operations that failed open.
    pub fn store_failures(&self) -> u64 {
        self.inner.store_failures.load(Ordering::Relaxed)
    }

    /// Cache entries removed by eviction.
    pub fn cache_evictions(&self) -> u64 {
        self.inner.cache_evictions.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = &self.inner;
        MetricsSnapshot {
            proceeded: inner.proceeded.load(Ordering::Relaxed),
            served_local: inner.served_local.load(Ordering::Relaxed),
            served_durable: inner.served_durable.load(Ordering::Relaxed),
            rejected_rate_limited: inner.rejected_rate_limited.load(Ordering::Relaxed),
            rejected_sampled: inner.rejected_sampled.load(Ordering::Relaxed),
            rejected_loop: inner.rejected_loop.load(Ordering::Relaxed),
            cache_evictions: inner.cache_evictions.load(Ordering::Relaxed),
            store_failures: inner.store_failures.load(Ordering::Relaxed),
            swept_entries: inner.swept_entries.load(Ordering::Relaxed),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.proceeded,
            &inner.served_local,
            &inner.served_durable,
            &inner.rejected_rate_limited,
            &inner.rejected_sampled,
            &inner.rejected_loop,
            &inner.cache_evictions,
            &inner.store_failures,
            &inner.swept_entries,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Calls admitted to run the operation
    pub proceeded: u64,
    /// Calls served from the in-process cache
    pub served_local: u64,
    /// Calls served from the durable store
    pub served_durable: u64,
    /// Calls rejected by the rate limiter
    pub rejected_rate_limited: u64,
    /// Calls shed by sampling
    pub rejected_sampled: u64,
    /// Calls rejected by loop detection
    pub rejected_loop: u64,
    /// Cache entries removed by eviction
    pub cache_evictions: u64,
    /// Durable store operations that failed open
    pub store_failures: u64,
    /// Entries removed by housekeeping
    pub swept_entries: u64,
}

impl MetricsSnapshot {
    /// Total rejected calls.
    pub fn rejected(&self) -> u64 {
        self.rejected_rate_limited
            .saturating_add(self.rejected_sampled)
            .saturating_add(self.rejected_loop)
    }

    /// Total evaluated calls that produced a decision.
    pub fn total_decisions(&self) -> u64 {
        self.proceeded
            .saturating_add(self.served_local)
            .saturating_add(self.served_durable)
            .saturating_add(self.rejected())
    }

    /// Fraction of admitted-past-the-checks calls answered from a cache.
    ///
    /// Returns 0.0 if nothing reached the cache stage.
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.served_local.saturating_add(self.served_durable);
        let total = hits.saturating_add(self.proceeded);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}
