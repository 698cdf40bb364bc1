//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports.

use crate::domain::outcome::OperationOutcome;
use crate::domain::time::Timestamp;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{self, Debug};
use std::hash::Hash;

/// Candidate entry for eviction consideration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate<K> {
    /// The key of the entry
    pub key: K,
    /// Last access time
    pub last_access: Timestamp,
}

/// Port for eviction policy decisions.
///
/// The cache delegates both "is it time to evict" and "which entries go" to
/// a pluggable policy.
pub trait EvictionPolicy<K>: Send + Sync + Debug
where
    K: Clone,
{
    /// Check if eviction should be triggered at the current size.
    fn should_evict(&self, current_entries: usize) -> bool;

    /// Select the entries to remove.
    ///
    /// # Arguments
    /// * `candidates` - Every entry in the cache; the policy may reorder them
    ///
    /// # Returns
    /// Keys of the entries to evict, possibly empty
    fn select_victims(&self, candidates: &mut [EvictionCandidate<K>]) -> Vec<K>;
}

/// Port for obtaining the current wall-clock time.
///
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Get the current time.
    fn now(&self) -> Timestamp;
}

/// Port for uniform random numbers.
pub trait RandomSource: Send + Sync + Debug {
    /// A uniformly distributed value in `[0, 1)`.
    fn next_f64(&self) -> f64;
}

/// Port for concurrent key-value storage of in-process state.
///
/// Every accessor runs while the entry is locked, so a read-modify-write
/// inside one closure is atomic with respect to other callers for that key.
/// Closures must not block or re-enter the same storage.
pub trait Storage<K, V>: Send + Sync + Debug
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Send + Sync,
{
    /// Access an entry with mutable access, creating it if necessary.
    ///
    /// # Arguments
    /// * `key` - The key to look up
    /// * `factory` - Function to create a new value if the key doesn't exist
    /// * `accessor` - Function that gets mutable access to the value
    ///
    /// # Returns
    /// The result from the accessor function
    fn with_entry_mut<F, R>(&self, key: K, factory: impl FnOnce() -> V, accessor: F) -> R
    where
        F: FnOnce(&mut V) -> R;

    /// Access an existing entry with mutable access.
    ///
    /// Returns `None` without calling `accessor` if the key is absent.
    fn with_existing_mut<F, R>(&self, key: &K, accessor: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R;

    /// Insert or overwrite a value.
    fn insert(&self, key: K, value: V);

    /// Remove a key, returning whether it was present.
    fn remove(&self, key: &K) -> bool;

    /// Get the number of entries in the storage.
    fn len(&self) -> usize;

    /// Check if the storage is empty.
    fn is_empty(&self) -> bool;

    /// Clear all entries from the storage.
    fn clear(&self);

    /// Iterate over all entries, providing access to both key and value.
    fn for_each<F>(&self, f: F)
    where
        F: FnMut(&K, &V);

    /// Remove entries for which the predicate returns false.
    fn retain<F>(&self, f: F)
    where
        F: FnMut(&K, &mut V) -> bool;
}

/// Durable snapshot of an outcome, shared across instances.
///
/// Serialized as `{ "payload": ..., "updatedAt": <epoch ms> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupeRecord {
    /// The recorded outcome
    pub payload: OperationOutcome,
    /// When the outcome was recorded
    #[serde(rename = "updatedAt")]
    pub updated_at: Timestamp,
}

/// Error reported by a durable store adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or refused the request
    Unavailable(String),
    /// A document could not be encoded or decoded
    Serialization(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(e) => write!(f, "durable store unavailable: {}", e),
            StoreError::Serialization(e) => write!(f, "durable document malformed: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Port for the external persistent document store.
///
/// One document per key, upserted whole. Concurrent writers race and the last
/// write wins.
#[async_trait]
pub trait DurableStore: Send + Sync + Debug {
    /// Load the document stored under `key`.
    async fn load(&self, key: &str) -> Result<Option<DedupeRecord>, StoreError>;

    /// Create or replace the document stored under `key`.
    async fn upsert(&self, key: &str, record: &DedupeRecord) -> Result<(), StoreError>;

    /// Remove documents last updated before `cutoff`, returning how many.
    ///
    /// Called from housekeeping, so it must not block on network I/O. Stores
    /// that expire documents on their own keep the default, which removes
    /// nothing.
    fn purge_older_than(&self, _cutoff: Timestamp) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// The guarded unit of work.
///
/// Must tolerate being run more than once for one logical request: instances
/// do not coordinate, so admission reduces duplicates but cannot rule them out.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Run the operation on behalf of `identity`.
    async fn run(&self, identity: &str, params: &Value) -> OperationOutcome;
}

/// Entries removed by one housekeeping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Expired cache entries
    pub cache_entries: usize,
    /// Abandoned rate windows
    pub rate_windows: usize,
    /// Idle burst states
    pub burst_states: usize,
    /// Stale documents purged from an in-process durable store
    pub durable_documents: usize,
}

impl SweepStats {
    /// Total entries removed.
    pub fn total(&self) -> usize {
        self.cache_entries + self.rate_windows + self.burst_states + self.durable_documents
    }
}

/// Port for anything that can run a housekeeping pass.
pub trait Housekeeping: Send + Sync {
    /// Drop expired and abandoned in-process state.
    fn sweep(&self) -> SweepStats;
}
