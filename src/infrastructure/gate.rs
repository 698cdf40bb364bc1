//! The admission gate.
//!
//! Composes the rate limiter, sampler, loop guard, TTL cache and durable
//! dedupe store into one `evaluate → run → record` pipeline in front of a
//! guarded operation.

use crate::application::{
    circuit_breaker::{CircuitBreaker, CircuitBreakerConfig},
    config::{ConfigError, GateConfig},
    dedupe::DedupeStore,
    loop_guard::LoopGuard,
    metrics::Metrics,
    ports::{Clock, DurableStore, Housekeeping, Operation, RandomSource, SweepStats},
    rate_limiter::{RateCheck, RateLimiter},
    sampler::Sampler,
    ttl_cache::TtlCache,
};
use crate::domain::{
    burst::{BurstDecision, BurstState},
    decision::{AdmissionToken, CacheSource, Decision, EvaluateOptions, RejectMeta, RejectReason},
    entry::CacheEntry,
    fingerprint::{Fingerprint, MAX_KEY_LEN},
    outcome::OperationOutcome,
    time::Timestamp,
    window::RateWindow,
};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::eviction::OldestFractionEviction;
use crate::infrastructure::memory_store::InMemoryDocumentStore;
use crate::infrastructure::random::ThreadRandom;
use crate::infrastructure::storage::ShardedStorage;

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
#[cfg(feature = "async")]
use std::sync::Weak;
use std::time::Duration;

#[cfg(feature = "async")]
use crate::application::sweeper::{Sweeper, SweeperConfig, SweeperHandle};

type CacheStorage = Arc<ShardedStorage<Fingerprint, CacheEntry>>;
type WindowStorage = Arc<ShardedStorage<String, RateWindow>>;
type BurstStorage = Arc<ShardedStorage<String, BurstState>>;

/// Error returned when a call's identity or key is unusable.
///
/// Invalid calls are never admitted, counted or cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Identity is empty or whitespace
    EmptyIdentity,
    /// Key is empty or whitespace
    EmptyKey,
    /// Key exceeds `MAX_KEY_LEN` bytes
    KeyTooLong {
        /// Actual length in bytes
        len: usize,
        /// Maximum accepted length
        max: usize,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyIdentity => write!(f, "identity must not be empty"),
            ValidationError::EmptyKey => write!(f, "key must not be empty"),
            ValidationError::KeyTooLong { len, max } => {
                write!(f, "key is {} bytes, maximum is {}", len, max)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Error returned when building an AdmissionGate fails.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildError {
    /// Gate configuration validation failed
    Config(ConfigError),
    /// Circuit breaker needs at least one failure to open
    ZeroFailureThreshold,
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::Config(e) => write!(f, "gate configuration error: {}", e),
            BuildError::ZeroFailureThreshold => {
                write!(f, "circuit breaker failure threshold must be greater than 0")
            }
        }
    }
}

impl std::error::Error for BuildError {}

impl From<ConfigError> for BuildError {
    fn from(e: ConfigError) -> Self {
        BuildError::Config(e)
    }
}

/// Result of [`AdmissionGate::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    /// The operation ran and its outcome was recorded
    Ran(OperationOutcome),
    /// A cached outcome was returned without running the operation
    Cached {
        /// The cached outcome
        outcome: OperationOutcome,
        /// Which cache produced it
        source: CacheSource,
    },
    /// The call was not admitted
    Rejected {
        /// Reason code
        reason: RejectReason,
        /// Structured details
        meta: RejectMeta,
    },
}

impl Execution {
    /// The outcome, if the call ran or was served from a cache.
    pub fn outcome(&self) -> Option<&OperationOutcome> {
        match self {
            Execution::Ran(outcome) | Execution::Cached { outcome, .. } => Some(outcome),
            Execution::Rejected { .. } => None,
        }
    }

    /// Check if the operation actually ran.
    pub fn ran(&self) -> bool {
        matches!(self, Execution::Ran(_))
    }
}

/// Builder for constructing an `AdmissionGate`.
pub struct AdmissionGateBuilder {
    config: GateConfig,
    clock: Option<Arc<dyn Clock>>,
    random: Option<Arc<dyn RandomSource>>,
    store: Option<Arc<dyn DurableStore>>,
    circuit_breaker: CircuitBreakerConfig,
}

impl AdmissionGateBuilder {
    /// Replace every tunable at once.
    pub fn with_config(mut self, config: GateConfig) -> Self {
        self.config = config;
        self
    }

    /// Set how long successful outcomes stay fresh.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    /// Set how long failed outcomes stay fresh.
    ///
    /// Defaults to the cache TTL.
    pub fn with_failure_ttl(mut self, ttl: Duration) -> Self {
        self.config.failure_ttl = Some(ttl);
        self
    }

    /// Set the cache size that triggers eviction.
    pub fn with_cache_max_size(mut self, max_size: usize) -> Self {
        self.config.cache_max_size = max_size;
        self
    }

    /// Set the share of the cache removed per eviction.
    pub fn with_eviction_fraction(mut self, fraction: f64) -> Self {
        self.config.eviction_fraction = fraction;
        self
    }

    /// Set the hourly ceilings.
    pub fn with_rate_limits(mut self, per_identity: u64, global: u64) -> Self {
        self.config.rate_limit_per_identity = per_identity;
        self.config.rate_limit_global = global;
        self
    }

    /// Set the loop detection thresholds.
    pub fn with_burst_detection(mut self, fast_threshold: Duration, max_calls: u32) -> Self {
        self.config.burst_fast_threshold = fast_threshold;
        self.config.burst_max_calls = max_calls;
        self
    }

    /// Set the fraction of calls admitted by sampling.
    pub fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.config.sampling_rate = rate;
        self
    }

    /// Set how long durable records stay fresh.
    ///
    /// Defaults to the cache TTL.
    pub fn with_dedupe_ttl(mut self, ttl: Duration) -> Self {
        self.config.dedupe_ttl = Some(ttl);
        self
    }

    /// Set the probability that an evaluation also sweeps.
    pub fn with_sweep_probability(mut self, probability: f64) -> Self {
        self.config.sweep_probability = probability;
        self
    }

    /// Set a custom clock (useful for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set a custom randomness source (useful for testing).
    pub fn with_random_source(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }

    /// Set the durable store shared with other instances.
    ///
    /// Without one, the gate keeps durable records in a private in-memory
    /// store.
    pub fn with_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Configure the circuit breaker around durable store I/O.
    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    /// Build the gate.
    ///
    /// # Errors
    /// Returns `BuildError` if the configuration is invalid.
    pub fn build(self) -> Result<AdmissionGate, BuildError> {
        self.config.validate()?;
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(BuildError::ZeroFailureThreshold);
        }

        let config = self.config;
        let metrics = Metrics::new();
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let random = self.random.unwrap_or_else(|| Arc::new(ThreadRandom::new()));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryDocumentStore::new()));

        let cache = TtlCache::new(
            Arc::new(ShardedStorage::with_capacity(config.cache_max_size)),
            config.cache_ttl,
            config.effective_failure_ttl(),
            Arc::new(OldestFractionEviction::new(
                config.cache_max_size,
                config.eviction_fraction,
            )),
            metrics.clone(),
        );
        let limiter = RateLimiter::new(
            Arc::new(ShardedStorage::new()),
            config.rate_limit_per_identity,
            config.rate_limit_global,
        );
        let loop_guard = LoopGuard::new(
            Arc::new(ShardedStorage::new()),
            config.burst_fast_threshold,
            config.burst_max_calls,
        );
        let breaker = Arc::new(CircuitBreaker::new(self.circuit_breaker, clock.clone()));
        let dedupe = DedupeStore::new(
            store,
            config.effective_dedupe_ttl(),
            config.effective_dedupe_ttl().min(config.effective_failure_ttl()),
            breaker,
            metrics.clone(),
        );

        Ok(AdmissionGate {
            inner: Arc::new(GateInner {
                sampler: Sampler::new(random),
                config,
                clock,
                cache,
                limiter,
                loop_guard,
                dedupe,
                metrics,
            }),
        })
    }
}

struct GateInner {
    config: GateConfig,
    clock: Arc<dyn Clock>,
    sampler: Sampler,
    cache: TtlCache<CacheStorage>,
    limiter: RateLimiter<WindowStorage>,
    loop_guard: LoopGuard<BurstStorage>,
    dedupe: DedupeStore,
    metrics: Metrics,
}

/// Call-admission and result-caching gate.
///
/// Cheap to clone; clones share all state. Each gate owns its in-process
/// state, and only the durable store is visible to other instances.
///
/// # Example
///
/// ```no_run
/// # use admission_gate::{AdmissionGate, Decision, EvaluateOptions, OperationOutcome};
/// # async fn example() {
/// let gate = AdmissionGate::builder().build().unwrap();
///
/// match gate.evaluate("user-42", "status/order-7", EvaluateOptions::default()).await {
///     Ok(Decision::Proceed(token)) => {
///         let outcome = OperationOutcome::success(serde_json::json!({ "state": "shipped" }));
///         gate.record(token, outcome).await;
///     }
///     Ok(Decision::ServeCached { outcome, .. }) => println!("cached: {:?}", outcome),
///     Ok(Decision::Reject { reason, .. }) => println!("rejected: {}", reason),
///     Err(e) => println!("invalid call: {}", e),
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
}

impl fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("config", &self.inner.config)
            .field("cache_entries", &self.inner.cache.len())
            .finish_non_exhaustive()
    }
}

impl AdmissionGate {
    /// Create a builder with default configuration.
    ///
    /// Defaults:
    /// - Cache: 5 minute TTL, 1000 entries, oldest 30% evicted
    /// - Rate limits: 100 per identity and 10,000 overall per hour
    /// - Loop detection: more than 5 calls under 1 second apart
    /// - Sampling: every call admitted
    /// - Housekeeping: on 1% of evaluations
    pub fn builder() -> AdmissionGateBuilder {
        AdmissionGateBuilder {
            config: GateConfig::default(),
            clock: None,
            random: None,
            store: None,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }

    fn validate(identity: &str, key: &str) -> Result<(), ValidationError> {
        if identity.trim().is_empty() {
            return Err(ValidationError::EmptyIdentity);
        }
        if key.trim().is_empty() {
            return Err(ValidationError::EmptyKey);
        }
        if key.len() > MAX_KEY_LEN {
            return Err(ValidationError::KeyTooLong {
                len: key.len(),
                max: MAX_KEY_LEN,
            });
        }
        Ok(())
    }

    fn reject(&self, identity: &str, reason: RejectReason, meta: RejectMeta) -> Decision {
        self.inner.metrics.record_rejected(reason);
        tracing::debug!(identity, reason = reason.as_str(), "call rejected");
        Decision::Reject { reason, meta }
    }

    fn rate_limited(&self, identity: &str, check: RateCheck) -> Option<Decision> {
        match check {
            RateCheck::Allowed => None,
            RateCheck::Denied {
                scope,
                limit,
                retry_after,
            } => Some(self.reject(
                identity,
                RejectReason::RateLimited,
                RejectMeta {
                    scope: Some(scope),
                    limit: Some(limit),
                    retry_after: Some(retry_after),
                    ..RejectMeta::default()
                },
            )),
        }
    }

    fn serve(&self, identity: &str, outcome: OperationOutcome, source: CacheSource) -> Decision {
        self.inner.metrics.record_served(source);
        tracing::debug!(identity, source = ?source, "served cached outcome");
        Decision::ServeCached { outcome, source }
    }

    /// Decide what to do with a call from `identity` for `key`.
    ///
    /// Checks run cheapest first: rate ceilings, sampling, loop detection,
    /// the local cache, then the durable store. A call that passes all of
    /// them is counted against the rate ceilings and admitted.
    ///
    /// # Errors
    /// Returns `ValidationError` for an empty identity or an empty or
    /// oversized key.
    pub async fn evaluate(
        &self,
        identity: &str,
        key: &str,
        options: EvaluateOptions,
    ) -> Result<Decision, ValidationError> {
        Self::validate(identity, key)?;
        let inner = &self.inner;
        let fingerprint = Fingerprint::from_raw(key);
        let now = inner.clock.now();

        if inner.sampler.admit(inner.config.sweep_probability) {
            inner.sweep_at(now);
        }

        if !options.force {
            if let Some(rejected) = self.rate_limited(identity, inner.limiter.check(identity, now)) {
                return Ok(rejected);
            }

            if !inner.sampler.admit(inner.config.sampling_rate) {
                return Ok(self.reject(identity, RejectReason::Sampled, RejectMeta::default()));
            }

            if let BurstDecision::LoopDetected { consecutive_calls } =
                inner.loop_guard.check(identity, now)
            {
                tracing::warn!(identity, consecutive_calls, "possible call loop detected");
                return Ok(self.reject(
                    identity,
                    RejectReason::LoopDetected,
                    RejectMeta {
                        consecutive_calls: Some(consecutive_calls),
                        ..RejectMeta::default()
                    },
                ));
            }
        }

        if !options.bypass_cache {
            if let Some(entry) = inner.cache.get(&fingerprint, now) {
                return Ok(self.serve(identity, entry.payload, CacheSource::Local));
            }

            if let Some(record) = inner.dedupe.get(&fingerprint, now).await {
                // keep the durable age so the local copy expires no later
                inner.cache.put_entry(
                    fingerprint,
                    CacheEntry::warmed(record.payload.clone(), record.updated_at, now),
                );
                return Ok(self.serve(identity, record.payload, CacheSource::Durable));
            }
        }

        if options.force {
            inner.limiter.record(identity, now);
        } else if let Some(rejected) =
            self.rate_limited(identity, inner.limiter.check_and_record(identity, now))
        {
            // another call took the last slot while we were reading the store
            return Ok(rejected);
        }

        inner.metrics.record_proceeded();
        tracing::debug!(identity, key = fingerprint.as_str(), force = options.force, "call admitted");
        Ok(Decision::Proceed(AdmissionToken::new(
            identity.to_string(),
            fingerprint,
            now,
        )))
    }

    fn record_local(&self, token: &AdmissionToken, outcome: &OperationOutcome) -> Timestamp {
        let now = self.inner.clock.now();
        self.inner
            .cache
            .put(token.fingerprint().clone(), outcome.clone(), now);
        now
    }

    /// Store the outcome of an admitted call.
    ///
    /// The local cache is updated before the first await. The durable write
    /// is best-effort: failures are logged and otherwise ignored.
    pub async fn record(&self, token: AdmissionToken, outcome: OperationOutcome) {
        let now = self.record_local(&token, &outcome);
        self.inner
            .dedupe
            .set(token.fingerprint(), outcome, now)
            .await;
    }

    /// Store the outcome of an admitted call, detaching the durable write.
    ///
    /// The local cache is updated immediately; the durable write runs as its
    /// own task and completes even if the caller is cancelled.
    ///
    /// **Requires the `async` feature** and a running tokio runtime.
    #[cfg(feature = "async")]
    pub fn record_detached(
        &self,
        token: AdmissionToken,
        outcome: OperationOutcome,
    ) -> tokio::task::JoinHandle<()> {
        let now = self.record_local(&token, &outcome);
        let dedupe = self.inner.dedupe.clone();
        tokio::spawn(async move {
            dedupe.set(token.fingerprint(), outcome, now).await;
        })
    }

    /// Run `operation` behind the gate.
    ///
    /// Evaluates the call, runs the operation only on admission, and records
    /// its outcome, failures included.
    ///
    /// # Errors
    /// Returns `ValidationError` for an unusable identity or key.
    pub async fn execute<O>(
        &self,
        identity: &str,
        key: &str,
        options: EvaluateOptions,
        params: &Value,
        operation: &O,
    ) -> Result<Execution, ValidationError>
    where
        O: Operation + ?Sized,
    {
        match self.evaluate(identity, key, options).await? {
            Decision::ServeCached { outcome, source } => Ok(Execution::Cached { outcome, source }),
            Decision::Reject { reason, meta } => Ok(Execution::Rejected { reason, meta }),
            Decision::Proceed(token) => {
                let outcome = operation.run(identity, params).await;
                if !outcome.is_success() {
                    tracing::debug!(identity, key, error = ?outcome.error, "operation failed");
                }
                self.record(token, outcome.clone()).await;
                Ok(Execution::Ran(outcome))
            }
        }
    }

    /// Drop expired cache entries, stale rate windows and idle burst states.
    ///
    /// Also purges stale documents from stores that support it, such as the
    /// default in-process store.
    pub fn sweep(&self) -> SweepStats {
        self.inner.sweep()
    }

    /// Start a background task sweeping on `config.interval`.
    ///
    /// The task holds no strong reference to the gate and exits once every
    /// clone of it has been dropped.
    ///
    /// **Requires the `async` feature** and a running tokio runtime.
    #[cfg(feature = "async")]
    pub fn spawn_sweeper(&self, config: SweeperConfig) -> SweeperHandle {
        let target: Weak<dyn Housekeeping> = Arc::<GateInner>::downgrade(&self.inner);
        Sweeper::new(target, config).start()
    }

    /// Get a reference to the metrics.
    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Get a reference to the circuit breaker guarding the durable store.
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        self.inner.dedupe.circuit_breaker()
    }

    /// Get the effective configuration.
    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }

    /// Number of local cache entries, expired ones included until swept.
    pub fn cache_len(&self) -> usize {
        self.inner.cache.len()
    }

    /// Calls counted for `identity` in the current hour on this instance.
    pub fn calls_this_hour(&self, identity: &str) -> u64 {
        self.inner
            .limiter
            .identity_count(identity, self.inner.clock.now())
    }

    /// Number of identities with rate or burst state.
    pub fn tracked_identities(&self) -> usize {
        self.inner
            .limiter
            .tracked_identities()
            .max(self.inner.loop_guard.tracked_identities())
    }
}

impl GateInner {
    fn sweep_at(&self, now: Timestamp) -> SweepStats {
        let stats = SweepStats {
            cache_entries: self.cache.sweep_expired(now),
            rate_windows: self.limiter.sweep(now),
            burst_states: self.loop_guard.sweep(now),
            durable_documents: self.dedupe.purge(now),
        };
        self.metrics.record_swept(stats.total());
        tracing::trace!(
            cache_entries = stats.cache_entries,
            rate_windows = stats.rate_windows,
            burst_states = stats.burst_states,
            durable_documents = stats.durable_documents,
            "swept expired state"
        );
        stats
    }
}

impl Housekeeping for GateInner {
    fn sweep(&self) -> SweepStats {
        self.sweep_at(self.clock.now())
    }
}

impl Housekeeping for AdmissionGate {
    fn sweep(&self) -> SweepStats {
        self.inner.sweep()
    }
}
