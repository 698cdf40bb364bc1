//! Mock clock for testing.

use crate::application::ports::Clock;
use crate::domain::time::Timestamp;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mock clock for testing.
///
/// Allows tests to control time progression explicitly, enabling deterministic
/// testing of TTLs, hour buckets and burst detection.
///
/// # Examples
///
/// ```
/// use admission_gate::infrastructure::mocks::MockClock;
/// use admission_gate::application::ports::Clock;
/// use admission_gate::domain::time::Timestamp;
/// use std::time::Duration;
///
/// let clock = MockClock::new(Timestamp::from_millis(1_000));
///
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), Timestamp::from_millis(11_000));
///
/// clock.set(Timestamp::from_millis(5));
/// assert_eq!(clock.now(), Timestamp::from_millis(5));
/// ```
///
/// # Thread Safety
///
/// All clones share the same underlying time value, so advancing time in
/// one clone affects all clones.
#[derive(Debug, Clone)]
pub struct MockClock {
    current_ms: Arc<AtomicU64>,
}

impl MockClock {
    /// Create a mock clock starting at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            current_ms: Arc::new(AtomicU64::new(start.as_millis())),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.current_ms.fetch_add(millis, Ordering::SeqCst);
    }

    /// Set the clock to a specific time.
    pub fn set(&self, now: Timestamp) {
        self.current_ms.store(now.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.current_ms.load(Ordering::SeqCst))
    }
}
