//! Wall-clock timestamps.
//!
//! Freshness of durable records must be comparable across process instances,
//! so every component works in milliseconds since the Unix epoch rather than
//! with a process-local `Instant`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::time::Duration;

/// Milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The Unix epoch.
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Create a timestamp from milliseconds since the epoch.
    pub const fn from_millis(millis: u64) -> Self {
        Timestamp(millis)
    }

    /// Milliseconds since the epoch.
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, or zero if `earlier` is in the future.
    ///
    /// Clocks on different instances drift; a record stamped slightly ahead of
    /// the local clock is treated as brand new rather than as an error.
    pub fn saturating_duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        let millis = u64::try_from(rhs.as_millis()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_since() {
        let a = Timestamp::from_millis(1_000);
        let b = Timestamp::from_millis(3_500);

        assert_eq!(b.saturating_duration_since(a), Duration::from_millis(2_500));
        assert_eq!(a.saturating_duration_since(b), Duration::ZERO);
    }

    #[test]
    fn test_add_saturates() {
        let t = Timestamp::from_millis(u64::MAX - 1);
        assert_eq!(t + Duration::from_secs(10), Timestamp::from_millis(u64::MAX));
        assert_eq!(
            Timestamp::EPOCH + Duration::from_secs(2),
            Timestamp::from_millis(2_000)
        );
    }

    #[test]
    fn test_serializes_as_plain_number() {
        let json = serde_json::to_string(&Timestamp::from_millis(42)).unwrap();
        assert_eq!(json, "42");
    }
}
