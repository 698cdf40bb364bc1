//! In-process outcome cache with time-to-live and bulk eviction.
//!
//! Entries expire lazily: `get` treats a stale entry as absent but leaves it
//! in place for the sweep to collect.

use crate::application::metrics::Metrics;
use crate::application::ports::{EvictionCandidate, EvictionPolicy, Storage};
use crate::domain::entry::CacheEntry;
use crate::domain::fingerprint::Fingerprint;
use crate::domain::outcome::OperationOutcome;
use crate::domain::time::Timestamp;
use std::sync::Arc;
use std::time::Duration;

/// Keyed store of recent outcomes.
///
/// Successful outcomes live for `ttl`, failed ones for `failure_ttl`.
#[derive(Debug, Clone)]
pub struct TtlCache<S>
where
    S: Storage<Fingerprint, CacheEntry> + Clone,
{
    storage: S,
    ttl: Duration,
    failure_ttl: Duration,
    eviction: Arc<dyn EvictionPolicy<Fingerprint>>,
    metrics: Metrics,
}

impl<S> TtlCache<S>
where
    S: Storage<Fingerprint, CacheEntry> + Clone,
{
    /// Create a cache over `storage`.
    pub fn new(
        storage: S,
        ttl: Duration,
        failure_ttl: Duration,
        eviction: Arc<dyn EvictionPolicy<Fingerprint>>,
        metrics: Metrics,
    ) -> Self {
        Self {
            storage,
            ttl,
            failure_ttl,
            eviction,
            metrics,
        }
    }

    fn ttl_for(&self, outcome: &OperationOutcome) -> Duration {
        if outcome.is_success() {
            self.ttl
        } else {
            self.failure_ttl
        }
    }

    /// Look up a fresh entry, recording the hit.
    pub fn get(&self, key: &Fingerprint, now: Timestamp) -> Option<CacheEntry> {
        self.storage
            .with_existing_mut(key, |entry| {
                if entry.is_fresh(now, self.ttl_for(&entry.payload)) {
                    entry.touch(now);
                    Some(entry.clone())
                } else {
                    None
                }
            })
            .flatten()
    }

    /// Store `payload` under `key`, replacing any previous entry, then evict
    /// if the cache has grown past its limit.
    ///
    /// Returns the number of entries evicted.
    pub fn put(&self, key: Fingerprint, payload: OperationOutcome, now: Timestamp) -> usize {
        self.put_entry(key, CacheEntry::new(payload, now))
    }

    /// Store a prepared `entry` under `key`, then evict as [`TtlCache::put`]
    /// does.
    pub fn put_entry(&self, key: Fingerprint, entry: CacheEntry) -> usize {
        self.storage.insert(key, entry);
        self.evict()
    }

    /// Remove the least recently accessed entries if over the limit.
    ///
    /// Returns the number of entries evicted.
    pub fn evict(&self) -> usize {
        if !self.eviction.should_evict(self.storage.len()) {
            return 0;
        }

        let mut candidates = Vec::with_capacity(self.storage.len());
        self.storage.for_each(|key, entry| {
            candidates.push(EvictionCandidate {
                key: key.clone(),
                last_access: entry.last_access_at,
            });
        });

        let victims = self.eviction.select_victims(&mut candidates);
        let evicted = victims
            .iter()
            .filter(|key| self.storage.remove(key))
            .count();

        if evicted > 0 {
            self.metrics.record_evictions(evicted);
            tracing::debug!(evicted, remaining = self.storage.len(), "cache evicted entries");
        }
        evicted
    }

    /// Drop every entry that is no longer fresh at `now`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_expired(&self, now: Timestamp) -> usize {
        let before = self.storage.len();
        self.storage
            .retain(|_, entry| entry.is_fresh(now, self.ttl_for(&entry.payload)));
        before.saturating_sub(self.storage.len())
    }

    /// Check whether `key` has an entry, fresh or not, without touching it.
    pub fn contains(&self, key: &Fingerprint) -> bool {
        self.storage.with_existing_mut(key, |_| ()).is_some()
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.storage.clear();
    }

    /// Time-to-live for successful outcomes.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Time-to-live for failed outcomes.
    pub fn failure_ttl(&self) -> Duration {
        self.failure_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::eviction::OldestFractionEviction;
    use crate::infrastructure::storage::ShardedStorage;
    use serde_json::json;

    type Cache = TtlCache<Arc<ShardedStorage<Fingerprint, CacheEntry>>>;

    fn cache(ttl_ms: u64, failure_ttl_ms: u64, max: usize) -> Cache {
        TtlCache::new(
            Arc::new(ShardedStorage::new()),
            Duration::from_millis(ttl_ms),
            Duration::from_millis(failure_ttl_ms),
            Arc::new(OldestFractionEviction::new(max, 0.3)),
            Metrics::new(),
        )
    }

    fn at(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn test_fresh_until_ttl() {
        let cache = cache(1_000, 1_000, 10);
        let key = Fingerprint::from_raw("k");
        cache.put(key.clone(), OperationOutcome::success(json!(1)), at(0));

        assert!(cache.get(&key, at(999)).is_some());
        assert!(cache.get(&key, at(1_000)).is_none());
        // expired entries stay until swept
        assert!(cache.contains(&key));
    }

    #[test]
    fn test_hit_updates_access() {
        let cache = cache(1_000, 1_000, 10);
        let key = Fingerprint::from_raw("k");
        cache.put(key.clone(), OperationOutcome::success(json!(1)), at(0));

        cache.get(&key, at(10));
        let entry = cache.get(&key, at(20)).unwrap();
        assert_eq!(entry.access_count, 3);
        assert_eq!(entry.last_access_at, at(20));
    }

    #[test]
    fn test_put_overwrites() {
        let cache = cache(1_000, 1_000, 10);
        let key = Fingerprint::from_raw("k");
        cache.put(key.clone(), OperationOutcome::success(json!(1)), at(0));
        cache.get(&key, at(5));
        cache.put(key.clone(), OperationOutcome::success(json!(2)), at(10));

        let entry = cache.get(&key, at(10)).unwrap();
        assert_eq!(entry.payload.payload, json!(2));
        assert_eq!(entry.created_at, at(10));
        assert_eq!(entry.access_count, 2);
    }

    #[test]
    fn test_failures_use_failure_ttl() {
        let cache = cache(1_000, 100, 10);
        let ok = Fingerprint::from_raw("ok");
        let bad = Fingerprint::from_raw("bad");
        cache.put(ok.clone(), OperationOutcome::success(json!(1)), at(0));
        cache.put(bad.clone(), OperationOutcome::failure("boom"), at(0));

        assert!(cache.get(&bad, at(99)).is_some());
        assert!(cache.get(&bad, at(100)).is_none());
        assert!(cache.get(&ok, at(100)).is_some());
    }

    #[test]
    fn test_put_entry_on_full_cache_keeps_recent_entry() {
        let cache = cache(60_000, 60_000, 3);
        for i in 0..3u64 {
            cache.put(
                Fingerprint::from_raw(format!("k{}", i)),
                OperationOutcome::success(json!(i)),
                at(100 + i),
            );
        }

        let key = Fingerprint::from_raw("copied");
        let evicted = cache.put_entry(
            key.clone(),
            CacheEntry::warmed(OperationOutcome::success(json!("x")), at(0), at(200)),
        );

        assert_eq!(evicted, 2);
        let entry = cache.get(&key, at(300)).unwrap();
        assert_eq!(entry.created_at, at(0));
        assert!(cache.get(&key, at(60_000)).is_none());
    }

    #[test]
    fn test_sweep_expired() {
        let cache = cache(100, 100, 10);
        cache.put(Fingerprint::from_raw("a"), OperationOutcome::success(json!(1)), at(0));
        cache.put(Fingerprint::from_raw("b"), OperationOutcome::success(json!(1)), at(50));

        assert_eq!(cache.sweep_expired(at(120)), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&Fingerprint::from_raw("b")));
    }

    #[test]
    fn test_put_evicts_least_recently_accessed() {
        let cache = cache(60_000, 60_000, 10);
        for i in 0..10u64 {
            cache.put(
                Fingerprint::from_raw(format!("k{}", i)),
                OperationOutcome::success(json!(i)),
                at(i),
            );
        }
        assert_eq!(cache.len(), 10);

        // touch the oldest so it survives
        cache.get(&Fingerprint::from_raw("k0"), at(100));

        let evicted = cache.put(
            Fingerprint::from_raw("k10"),
            OperationOutcome::success(json!(10)),
            at(101),
        );
        assert_eq!(evicted, 4);
        assert_eq!(cache.len(), 7);
        assert!(cache.contains(&Fingerprint::from_raw("k0")));
        assert!(cache.contains(&Fingerprint::from_raw("k10")));
        for gone in ["k1", "k2", "k3", "k4"] {
            assert!(!cache.contains(&Fingerprint::from_raw(gone)));
        }
    }
}
