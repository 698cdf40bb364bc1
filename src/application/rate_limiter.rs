//! Hour-bucket call ceilings, per identity and instance-wide.
//!
//! Counts are per process. A fleet of N instances admits up to N times the
//! configured ceiling in the worst case.

use crate::application::ports::Storage;
use crate::domain::time::Timestamp;
use crate::domain::window::{LimitScope, RateWindow};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateCheck {
    /// Both ceilings have room
    Allowed,
    /// A ceiling was reached
    Denied {
        /// Which ceiling
        scope: LimitScope,
        /// Its configured value
        limit: u64,
        /// Time until its bucket resets
        retry_after: Duration,
    },
}

impl RateCheck {
    /// Check if the call fits under both ceilings.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateCheck::Allowed)
    }
}

/// Hourly ceilings for a single instance.
///
/// Lock order is always identity entry, then the global window.
#[derive(Debug)]
pub struct RateLimiter<S>
where
    S: Storage<String, RateWindow>,
{
    windows: S,
    global: Mutex<RateWindow>,
    per_identity_limit: u64,
    global_limit: u64,
}

impl<S> RateLimiter<S>
where
    S: Storage<String, RateWindow>,
{
    /// Create a limiter with the given hourly ceilings.
    pub fn new(windows: S, per_identity_limit: u64, global_limit: u64) -> Self {
        Self {
            windows,
            global: Mutex::new(RateWindow::open(Timestamp::EPOCH)),
            per_identity_limit,
            global_limit,
        }
    }

    fn global_window(&self) -> std::sync::MutexGuard<'_, RateWindow> {
        self.global.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn identity_denied(&self, window: &RateWindow, now: Timestamp) -> Option<RateCheck> {
        if window.has_capacity(self.per_identity_limit, now) {
            None
        } else {
            Some(RateCheck::Denied {
                scope: LimitScope::Identity,
                limit: self.per_identity_limit,
                retry_after: window.retry_after(now),
            })
        }
    }

    fn global_denied(&self, window: &RateWindow, now: Timestamp) -> Option<RateCheck> {
        if window.has_capacity(self.global_limit, now) {
            None
        } else {
            Some(RateCheck::Denied {
                scope: LimitScope::Global,
                limit: self.global_limit,
                retry_after: window.retry_after(now),
            })
        }
    }

    /// Check both ceilings without counting anything.
    pub fn check(&self, identity: &str, now: Timestamp) -> RateCheck {
        let denied = self
            .windows
            .with_existing_mut(&identity.to_string(), |window| {
                self.identity_denied(window, now)
            })
            // an identity with no window has a count of zero
            .unwrap_or_else(|| self.identity_denied(&RateWindow::open(now), now));
        if let Some(denied) = denied {
            return denied;
        }

        let global = self.global_window();
        self.global_denied(&global, now)
            .unwrap_or(RateCheck::Allowed)
    }

    /// Count one call against both ceilings, unconditionally.
    pub fn record(&self, identity: &str, now: Timestamp) {
        self.windows.with_entry_mut(
            identity.to_string(),
            || RateWindow::open(now),
            |window| {
                window.increment(now);
                self.global_window().increment(now);
            },
        );
    }

    /// Check both ceilings and, if both have room, count the call.
    ///
    /// The check and the increment happen under the identity's entry lock,
    /// so two concurrent callers cannot both take the last slot.
    pub fn check_and_record(&self, identity: &str, now: Timestamp) -> RateCheck {
        self.windows.with_entry_mut(
            identity.to_string(),
            || RateWindow::open(now),
            |window| {
                if let Some(denied) = self.identity_denied(window, now) {
                    return denied;
                }
                let mut global = self.global_window();
                if let Some(denied) = self.global_denied(&global, now) {
                    return denied;
                }
                window.increment(now);
                global.increment(now);
                RateCheck::Allowed
            },
        )
    }

    /// Calls counted for `identity` in the current hour.
    pub fn identity_count(&self, identity: &str, now: Timestamp) -> u64 {
        self.windows
            .with_existing_mut(&identity.to_string(), |window| window.count_at(now))
            .unwrap_or(0)
    }

    /// Calls counted instance-wide in the current hour.
    pub fn global_count(&self, now: Timestamp) -> u64 {
        self.global_window().count_at(now)
    }

    /// Drop identity windows whose hour has passed.
    ///
    /// Returns the number of windows removed.
    pub fn sweep(&self, now: Timestamp) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, window| window.is_current(now));
        before.saturating_sub(self.windows.len())
    }

    /// Number of tracked identity windows.
    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }

    /// Per-identity hourly ceiling.
    pub fn per_identity_limit(&self) -> u64 {
        self.per_identity_limit
    }

    /// Instance-wide hourly ceiling.
    pub fn global_limit(&self) -> u64 {
        self.global_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::storage::ShardedStorage;
    use std::sync::Arc;

    const HOUR_MS: u64 = 3_600_000;

    fn limiter(per_identity: u64, global: u64) -> RateLimiter<Arc<ShardedStorage<String, RateWindow>>> {
        RateLimiter::new(Arc::new(ShardedStorage::new()), per_identity, global)
    }

    fn at(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn test_identity_ceiling() {
        let limiter = limiter(2, 100);
        let now = at(5 * HOUR_MS + 10);

        assert!(limiter.check_and_record("u1", now).is_allowed());
        assert!(limiter.check_and_record("u1", now).is_allowed());

        match limiter.check_and_record("u1", now) {
            RateCheck::Denied {
                scope,
                limit,
                retry_after,
            } => {
                assert_eq!(scope, LimitScope::Identity);
                assert_eq!(limit, 2);
                assert_eq!(retry_after, Duration::from_millis(HOUR_MS - 10));
            }
            other => panic!("expected denial, got {:?}", other),
        }

        // other identities are unaffected
        assert!(limiter.check("u2", now).is_allowed());
    }

    #[test]
    fn test_new_hour_resets() {
        let limiter = limiter(2, 100);
        let now = at(5 * HOUR_MS + 10);
        limiter.record("u1", now);
        limiter.record("u1", now);
        assert!(!limiter.check("u1", now).is_allowed());

        let next_hour = at(6 * HOUR_MS);
        assert!(limiter.check("u1", next_hour).is_allowed());
        assert!(limiter.check_and_record("u1", next_hour).is_allowed());
        assert_eq!(limiter.identity_count("u1", next_hour), 1);
    }

    #[test]
    fn test_global_ceiling() {
        let limiter = limiter(10, 3);
        let now = at(HOUR_MS);
        assert!(limiter.check_and_record("a", now).is_allowed());
        assert!(limiter.check_and_record("b", now).is_allowed());
        assert!(limiter.check_and_record("c", now).is_allowed());

        let check = limiter.check_and_record("d", now);
        assert!(matches!(
            check,
            RateCheck::Denied {
                scope: LimitScope::Global,
                limit: 3,
                ..
            }
        ));
        assert_eq!(limiter.global_count(now), 3);
        assert_eq!(limiter.identity_count("d", now), 0);
    }

    #[test]
    fn test_check_is_read_only() {
        let limiter = limiter(1, 1);
        let now = at(0);
        for _ in 0..5 {
            assert!(limiter.check("u1", now).is_allowed());
        }
        assert_eq!(limiter.tracked_identities(), 0);
        assert_eq!(limiter.global_count(now), 0);
    }

    #[test]
    fn test_zero_limit_denies_unknown_identity() {
        let limiter = limiter(0, 10);
        assert!(!limiter.check("fresh", at(0)).is_allowed());
        assert!(!limiter.check_and_record("fresh", at(0)).is_allowed());
    }

    #[test]
    fn test_sweep_drops_stale_windows() {
        let limiter = limiter(10, 100);
        limiter.record("old", at(0));
        limiter.record("new", at(HOUR_MS + 5));

        assert_eq!(limiter.sweep(at(HOUR_MS + 10)), 1);
        assert_eq!(limiter.tracked_identities(), 1);
        assert_eq!(limiter.identity_count("new", at(HOUR_MS + 10)), 1);
    }

    #[test]
    fn test_concurrent_admission_respects_ceiling() {
        use std::thread;

        let limiter = Arc::new(limiter(50, 10_000));
        let mut handles = vec![];
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            handles.push(thread::spawn(move || {
                (0..20)
                    .filter(|_| limiter.check_and_record("shared", at(0)).is_allowed())
                    .count()
            }));
        }

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
        assert_eq!(limiter.identity_count("shared", at(0)), 50);
    }
}
