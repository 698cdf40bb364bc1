//! # admission-gate
//!
//! Call admission and result caching for fleets of stateless instances.
//!
//! An [`AdmissionGate`] sits in front of an expensive or side-effecting
//! operation and decides, per call, whether to run it, answer from a cache,
//! or turn the call away. It combines:
//!
//! - an in-process **TTL cache** of recent outcomes, failures included
//! - **hourly rate ceilings** per identity and per instance
//! - **loop detection** for identities hammering the same path
//! - **probabilistic sampling** for best-effort traffic
//! - a **durable dedupe store** shared by every instance
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use admission_gate::{AdmissionGate, EvaluateOptions, Execution, Operation, OperationOutcome};
//! use async_trait::async_trait;
//! use serde_json::{json, Value};
//!
//! struct CheckStatus;
//!
//! #[async_trait]
//! impl Operation for CheckStatus {
//!     async fn run(&self, _identity: &str, params: &Value) -> OperationOutcome {
//!         OperationOutcome::success(json!({ "order": params["order"], "state": "shipped" }))
//!     }
//! }
//!
//! # async fn example() {
//! let gate = AdmissionGate::builder().build().expect("valid config");
//!
//! let params = json!({ "order": 7 });
//! match gate
//!     .execute("user-42", "status/7", EvaluateOptions::default(), &params, &CheckStatus)
//!     .await
//! {
//!     Ok(Execution::Ran(outcome)) => println!("fresh: {:?}", outcome),
//!     Ok(Execution::Cached { outcome, source }) => println!("{:?}: {:?}", source, outcome),
//!     Ok(Execution::Rejected { reason, .. }) => println!("not now: {}", reason),
//!     Err(e) => println!("bad call: {}", e),
//! }
//! # }
//! ```
//!
//! ## The Pipeline
//!
//! `evaluate` runs these steps in order and stops at the first that decides:
//!
//! 1. Occasional housekeeping of expired state
//! 2. Rate ceilings (skipped with `force`)
//! 3. Sampling (skipped with `force`)
//! 4. Loop detection (skipped with `force`)
//! 5. Local cache (skipped with `bypass_cache`)
//! 6. Durable store (skipped with `bypass_cache`)
//! 7. Admission: the call is counted against the ceilings and proceeds
//!
//! The caller runs the operation and hands the outcome to `record`, which
//! fills the local cache synchronously and writes the durable store
//! best-effort.
//!
//! ## Consistency
//!
//! Only the durable store is shared. Rate ceilings and loop detection are per
//! instance, so a fleet of N instances admits up to N times a ceiling.
//! Concurrent instances can both miss the durable store and both run the
//! operation; operations must tolerate running more than once.
//!
//! ## Failing Open
//!
//! Durable store errors are logged at `warn`, counted in [`Metrics`], and
//! treated as a miss. After repeated failures a [`CircuitBreaker`] stops
//! calling the store until a single recovery trial call succeeds. The gate
//! never fails a call because its safety net is down.
//!
//! ## Configuration
//!
//! ```rust,no_run
//! use admission_gate::{AdmissionGate, GateConfig};
//! use std::time::Duration;
//!
//! // From CACHE_TTL_MS, RATE_LIMIT_PER_IDENTITY_PER_HOUR, ... in the environment
//! let config = GateConfig::from_env().expect("valid environment");
//!
//! let gate = AdmissionGate::builder()
//!     .with_config(config)
//!     .with_failure_ttl(Duration::from_secs(30))
//!     .build()
//!     .expect("valid config");
//! ```
//!
//! ## Feature Flags
//!
//! - `async` (default): background [`Sweeper`] and detached durable writes
//! - `redis-storage`: [`RedisDocumentStore`]
//! - `test-helpers`: test doubles in `infrastructure::mocks`

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    burst::{BurstDecision, BurstState},
    decision::{AdmissionToken, CacheSource, Decision, EvaluateOptions, RejectMeta, RejectReason},
    entry::CacheEntry,
    fingerprint::{Fingerprint, MAX_KEY_LEN},
    outcome::OperationOutcome,
    time::Timestamp,
    window::{LimitScope, RateWindow},
};

pub use application::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState},
    config::{ConfigError, GateConfig},
    dedupe::DedupeStore,
    loop_guard::LoopGuard,
    metrics::{Metrics, MetricsSnapshot},
    ports::{
        Clock, DedupeRecord, DurableStore, EvictionCandidate, EvictionPolicy, Housekeeping,
        Operation, RandomSource, Storage, StoreError, SweepStats,
    },
    rate_limiter::{RateCheck, RateLimiter},
    sampler::Sampler,
    ttl_cache::TtlCache,
};

#[cfg(feature = "async")]
pub use application::sweeper::{
    ShutdownError, Sweeper, SweeperConfig, SweeperConfigError, SweeperHandle,
};

pub use infrastructure::{
    clock::SystemClock,
    eviction::OldestFractionEviction,
    gate::{AdmissionGate, AdmissionGateBuilder, BuildError, Execution, ValidationError},
    memory_store::InMemoryDocumentStore,
    random::ThreadRandom,
    storage::ShardedStorage,
};

#[cfg(feature = "redis-storage")]
pub use infrastructure::redis_store::{RedisDocumentStore, RedisStoreConfig};
