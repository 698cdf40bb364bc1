//! Durable, cross-instance lookaside cache.
//!
//! Wraps a [`DurableStore`] with freshness checks and fail-open error
//! handling. A failing store degrades the gate to per-instance behavior; it
//! never turns into an error for the caller.

use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::metrics::Metrics;
use crate::application::ports::{DedupeRecord, DurableStore};
use crate::domain::fingerprint::Fingerprint;
use crate::domain::outcome::OperationOutcome;
use crate::domain::time::Timestamp;
use std::sync::Arc;
use std::time::Duration;

/// Freshness-aware, fail-open view of the durable store.
#[derive(Debug, Clone)]
pub struct DedupeStore {
    store: Arc<dyn DurableStore>,
    ttl: Duration,
    failure_ttl: Duration,
    breaker: Arc<CircuitBreaker>,
    metrics: Metrics,
}

impl DedupeStore {
    /// Create a dedupe store over `store`.
    ///
    /// Records of failed outcomes stay fresh for `failure_ttl`, others for
    /// `ttl`.
    pub fn new(
        store: Arc<dyn DurableStore>,
        ttl: Duration,
        failure_ttl: Duration,
        breaker: Arc<CircuitBreaker>,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            ttl,
            failure_ttl,
            breaker,
            metrics,
        }
    }

    /// Read a record that is still fresh at `now`.
    ///
    /// Store errors, malformed documents and an open circuit all read as a
    /// miss.
    pub async fn get(&self, key: &Fingerprint, now: Timestamp) -> Option<DedupeRecord> {
        if !self.breaker.allow_request() {
            tracing::trace!(key = %key, "durable store circuit open, skipping read");
            return None;
        }

        match self.store.load(key.as_str()).await {
            Ok(record) => {
                self.breaker.record_success();
                record.filter(|r| now.saturating_duration_since(r.updated_at) < self.ttl_for(r))
            }
            Err(e) => {
                self.breaker.record_failure();
                self.metrics.record_store_failure();
                tracing::warn!(key = %key, error = %e, "durable store read failed, treating as miss");
                None
            }
        }
    }

    /// Upsert the outcome for `key` stamped at `now`.
    ///
    /// Failures are logged and otherwise ignored.
    pub async fn set(&self, key: &Fingerprint, payload: OperationOutcome, now: Timestamp) {
        if !self.breaker.allow_request() {
            tracing::trace!(key = %key, "durable store circuit open, skipping write");
            return;
        }

        let record = DedupeRecord {
            payload,
            updated_at: now,
        };
        match self.store.upsert(key.as_str(), &record).await {
            Ok(()) => self.breaker.record_success(),
            Err(e) => {
                self.breaker.record_failure();
                self.metrics.record_store_failure();
                tracing::warn!(key = %key, error = %e, "durable store write failed, skipping");
            }
        }
    }

    /// Purge documents too old to be fresh for any outcome at `now`.
    ///
    /// Only stores that opt in do anything here. Failures are logged and
    /// counted like other store failures.
    pub fn purge(&self, now: Timestamp) -> usize {
        let horizon = self.ttl.max(self.failure_ttl);
        let cutoff = Timestamp::from_millis(
            now.as_millis()
                .saturating_sub(horizon.as_millis().try_into().unwrap_or(u64::MAX)),
        );
        match self.store.purge_older_than(cutoff) {
            Ok(purged) => purged,
            Err(e) => {
                self.metrics.record_store_failure();
                tracing::warn!(error = %e, "durable store purge failed, skipping");
                0
            }
        }
    }

    fn ttl_for(&self, record: &DedupeRecord) -> Duration {
        if record.payload.is_success() {
            self.ttl
        } else {
            self.failure_ttl
        }
    }

    /// Freshness window for durable records.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Freshness window for records of failed outcomes.
    pub fn failure_ttl(&self) -> Duration {
        self.failure_ttl
    }

    /// The breaker guarding store I/O.
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}
