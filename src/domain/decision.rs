//! Admission decisions.
//!
//! Every evaluated call ends in exactly one of three decisions. Rejections are
//! data, not errors: "did not run" is a normal outcome callers branch on.

use super::fingerprint::Fingerprint;
use super::outcome::OperationOutcome;
use super::time::Timestamp;
use super::window::LimitScope;
use std::fmt;
use std::time::Duration;

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvaluateOptions {
    /// Skip the rate, sampling and loop checks
    pub force: bool,
    /// Skip the local cache and durable store lookups
    pub bypass_cache: bool,
}

impl EvaluateOptions {
    /// Options that skip the rate, sampling and loop checks.
    pub fn forced() -> Self {
        Self {
            force: true,
            bypass_cache: false,
        }
    }

    /// Options that always run the operation fresh.
    pub fn bypassing_cache() -> Self {
        Self {
            force: false,
            bypass_cache: true,
        }
    }
}

/// Why a call was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// An hourly ceiling was reached
    RateLimited,
    /// Shed by probabilistic sampling
    Sampled,
    /// Too many consecutive fast calls from the same identity
    LoopDetected,
}

impl RejectReason {
    /// Machine-readable reason code.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::RateLimited => "rate_limited",
            RejectReason::Sampled => "sampled",
            RejectReason::LoopDetected => "loop_detected",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Details attached to a rejection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RejectMeta {
    /// Which ceiling was hit, for `RateLimited`
    pub scope: Option<LimitScope>,
    /// Configured ceiling for that scope
    pub limit: Option<u64>,
    /// Time until the ceiling resets
    pub retry_after: Option<Duration>,
    /// Length of the fast-call run, for `LoopDetected`
    pub consecutive_calls: Option<u32>,
}

/// Where a cached outcome came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// This instance's in-process cache
    Local,
    /// The shared durable store
    Durable,
}

/// Proof of admission, handed back to `record` once the operation has run.
///
/// Deliberately not `Clone`: one admission records one outcome.
#[derive(Debug, PartialEq, Eq)]
pub struct AdmissionToken {
    identity: String,
    fingerprint: Fingerprint,
    admitted_at: Timestamp,
}

impl AdmissionToken {
    pub(crate) fn new(identity: String, fingerprint: Fingerprint, admitted_at: Timestamp) -> Self {
        Self {
            identity,
            fingerprint,
            admitted_at,
        }
    }

    /// The identity the call was admitted for.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The key the outcome will be cached under.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// When the call was admitted.
    pub fn admitted_at(&self) -> Timestamp {
        self.admitted_at
    }
}

/// Result of evaluating a call.
#[derive(Debug, PartialEq)]
pub enum Decision {
    /// A fresh outcome exists; return it without running the operation
    ServeCached {
        /// The cached outcome
        outcome: OperationOutcome,
        /// Which cache produced it
        source: CacheSource,
    },
    /// The call must not run
    Reject {
        /// Reason code
        reason: RejectReason,
        /// Structured details
        meta: RejectMeta,
    },
    /// Run the operation, then pass the token to `record`
    Proceed(AdmissionToken),
}

impl Decision {
    /// Check if the call should run.
    pub fn is_proceed(&self) -> bool {
        matches!(self, Decision::Proceed(_))
    }

    /// Check if the call was served from a cache.
    pub fn is_cached(&self) -> bool {
        matches!(self, Decision::ServeCached { .. })
    }

    /// The rejection reason, if rejected.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Decision::Reject { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}
