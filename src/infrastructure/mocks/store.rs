//! Durable store double with failure injection.

use crate::application::ports::{DedupeRecord, DurableStore, StoreError};
use crate::domain::time::Timestamp;
use crate::infrastructure::memory_store::InMemoryDocumentStore;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Counters {
    failing: AtomicBool,
    loads: AtomicUsize,
    upserts: AtomicUsize,
}

/// In-memory durable store that counts calls and can be told to fail.
///
/// Clones share documents, counters and the failure switch.
#[derive(Debug, Clone, Default)]
pub struct MockDocumentStore {
    inner: InMemoryDocumentStore,
    counters: Arc<Counters>,
}

impl MockDocumentStore {
    /// Create a healthy, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store over existing documents.
    pub fn wrapping(inner: InMemoryDocumentStore) -> Self {
        Self {
            inner,
            counters: Arc::default(),
        }
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.counters.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `load` calls, failed ones included.
    pub fn load_calls(&self) -> usize {
        self.counters.loads.load(Ordering::SeqCst)
    }

    /// Number of `upsert` calls, failed ones included.
    pub fn upsert_calls(&self) -> usize {
        self.counters.upserts.load(Ordering::SeqCst)
    }

    /// The documents behind this mock.
    pub fn documents(&self) -> &InMemoryDocumentStore {
        &self.inner
    }

    fn check_failing(&self) -> Result<(), StoreError> {
        if self.counters.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DurableStore for MockDocumentStore {
    async fn load(&self, key: &str) -> Result<Option<DedupeRecord>, StoreError> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        self.inner.load(key).await
    }

    async fn upsert(&self, key: &str, record: &DedupeRecord) -> Result<(), StoreError> {
        self.counters.upserts.fetch_add(1, Ordering::SeqCst);
        self.check_failing()?;
        self.inner.upsert(key, record).await
    }

    fn purge_older_than(&self, cutoff: Timestamp) -> Result<usize, StoreError> {
        self.check_failing()?;
        Ok(self.inner.purge_older_than(cutoff))
    }
}
