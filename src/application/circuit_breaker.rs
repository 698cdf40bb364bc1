//! Circuit breaker around durable store I/O.
//!
//! When the durable store keeps failing, the breaker opens and the gate stops
//! talking to it for a while. Callers treat an open circuit exactly like a
//! store miss, so admission keeps working on in-process state alone.

use crate::application::ports::Clock;
use crate::domain::time::Timestamp;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Store calls go through
    Closed = 0,
    /// Store calls are skipped
    Open = 1,
    /// A single trial call is in flight to test recovery
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit
    pub failure_threshold: u32,
    /// Duration to wait before attempting recovery
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Circuit breaker for durable store calls.
///
/// Time comes from the injected clock so recovery can be tested without
/// sleeping.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    consecutive_failures: AtomicU64,
    last_failure_ms: AtomicU64,
    trial_started_ms: AtomicU64,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a circuit breaker reading time from `clock`.
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(0),
            trial_started_ms: AtomicU64::new(0),
            config,
            clock,
        }
    }

    /// Get the current circuit state.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Get the breaker configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Check if a store call may be attempted.
    ///
    /// Returns `false` while open; callers then skip the store and fail open.
    /// Once the recovery timeout has passed exactly one caller is let through
    /// as a trial, and everyone else keeps failing open until that caller
    /// reports back. A trial that never reports is replaced after another
    /// recovery timeout.
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => self.take_stale_trial(),
            CircuitState::Open => {
                let now = self.clock.now();
                if now.saturating_duration_since(self.last_failure()) < self.config.recovery_timeout
                {
                    return false;
                }

                // Stamped before the transition so HalfOpen readers never see
                // the previous trial's start
                self.trial_started_ms
                    .store(now.as_millis(), Ordering::Release);
                // Only one caller wins the Open -> HalfOpen transition
                let won = self
                    .state
                    .compare_exchange(
                        CircuitState::Open as u8,
                        CircuitState::HalfOpen as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok();
                if won {
                    tracing::debug!("durable store circuit half-open, sending trial call");
                }
                won
            }
        }
    }

    fn take_stale_trial(&self) -> bool {
        let now = self.clock.now();
        let started = self.trial_started_ms.load(Ordering::Acquire);
        if now.saturating_duration_since(Timestamp::from_millis(started))
            < self.config.recovery_timeout
        {
            return false;
        }
        self.trial_started_ms
            .compare_exchange(started, now.as_millis(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Record a successful store call.
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                self.consecutive_failures.store(0, Ordering::Release);
                self.state
                    .store(CircuitState::Closed as u8, Ordering::Release);
                tracing::info!("durable store circuit closed");
            }
            CircuitState::Closed => {
                self.consecutive_failures.store(0, Ordering::Release);
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed store call.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        self.last_failure_ms
            .store(self.clock.now().as_millis(), Ordering::Release);

        match self.state() {
            CircuitState::HalfOpen => {
                self.state.store(CircuitState::Open as u8, Ordering::Release);
                tracing::warn!(failures, "durable store trial call failed, circuit re-opened");
            }
            CircuitState::Closed => {
                if failures >= u64::from(self.config.failure_threshold)
                    && self
                        .state
                        .compare_exchange(
                            CircuitState::Closed as u8,
                            CircuitState::Open as u8,
                            Ordering::AcqRel,
                            Ordering::Acquire,
                        )
                        .is_ok()
                {
                    tracing::warn!(
                        failures,
                        recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
                        "durable store circuit opened"
                    );
                }
            }
            CircuitState::Open => {}
        }
    }

    fn last_failure(&self) -> Timestamp {
        Timestamp::from_millis(self.last_failure_ms.load(Ordering::Acquire))
    }

    /// Get the number of consecutive failures.
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Reset the circuit breaker to closed state.
    pub fn reset(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.trial_started_ms.store(0, Ordering::Release);
        self.consecutive_failures.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;
    use std::thread;

    fn breaker(threshold: u32, recovery_ms: u64) -> (CircuitBreaker, MockClock) {
        let clock = MockClock::new(Timestamp::from_millis(10_000));
        let cb = CircuitBreaker::new(
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: Duration::from_millis(recovery_ms),
            },
            Arc::new(clock.clone()),
        );
        (cb, clock)
    }

    #[test]
    fn test_initial_state() {
        let (cb, _) = breaker(5, 1000);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_failure_threshold() {
        let (cb, _) = breaker(3, 1000);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 2);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_recovery_after_timeout() {
        let (cb, clock) = breaker(2, 100);
        cb.record_failure();
        cb.record_failure();

        clock.advance(Duration::from_millis(99));
        assert!(!cb.allow_request());
        assert_eq!(cb.state(), CircuitState::Open);

        clock.advance(Duration::from_millis(1));
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_admits_single_trial() {
        let (cb, clock) = breaker(2, 100);
        cb.record_failure();
        cb.record_failure();
        clock.advance(Duration::from_millis(100));

        assert!(cb.allow_request());
        assert!(!cb.allow_request());
        assert!(!cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert!(cb.allow_request());
        assert!(cb.allow_request());
    }

    #[test]
    fn test_unreported_trial_is_replaced_after_timeout() {
        let (cb, clock) = breaker(1, 100);
        cb.record_failure();
        clock.advance(Duration::from_millis(100));
        assert!(cb.allow_request());

        clock.advance(Duration::from_millis(99));
        assert!(!cb.allow_request());
        clock.advance(Duration::from_millis(1));
        assert!(cb.allow_request());
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_concurrent_callers_share_one_trial() {
        let (cb, clock) = breaker(1, 100);
        cb.record_failure();
        clock.advance(Duration::from_millis(100));
        let cb = Arc::new(cb);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cb = Arc::clone(&cb);
                thread::spawn(move || cb.allow_request())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_half_open_success_closes_circuit() {
        let (cb, clock) = breaker(2, 100);
        cb.record_failure();
        cb.record_failure();
        clock.advance(Duration::from_millis(150));
        cb.allow_request();

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_half_open_failure_reopens_circuit() {
        let (cb, clock) = breaker(2, 100);
        cb.record_failure();
        cb.record_failure();
        clock.advance(Duration::from_millis(150));
        cb.allow_request();

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        // the failure restarts the recovery timer
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let (cb, _) = breaker(5, 100);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.consecutive_failures(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_reset() {
        let (cb, _) = breaker(1, 10_000);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_concurrent_failures() {
        let (cb, _) = breaker(5, 1000);
        let cb = Arc::new(cb);
        let mut handles = vec![];

        for _ in 0..10 {
            let cb_clone = Arc::clone(&cb);
            handles.push(thread::spawn(move || {
                cb_clone.record_failure();
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cb.consecutive_failures(), 10);
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
