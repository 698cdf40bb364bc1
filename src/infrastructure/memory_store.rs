//! In-process durable store.
//!
//! Useful for tests and for several gates sharing one process. Freshness is
//! judged by the reader; stale documents stay until a gate sweep purges them.

use crate::application::ports::{DedupeRecord, DurableStore, StoreError};
use crate::domain::time::Timestamp;
use ahash::RandomState;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Durable store held in memory.
///
/// Clones share the same documents, so handing one clone to each of several
/// gates behaves like a shared external store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: Arc<DashMap<String, DedupeRecord, RandomState>>,
}

impl InMemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Read a document without going through the async port.
    pub fn get(&self, key: &str) -> Option<DedupeRecord> {
        self.documents.get(key).map(|doc| doc.value().clone())
    }

    /// Remove every document.
    pub fn clear(&self) {
        self.documents.clear();
    }

    /// Drop documents last updated before `cutoff`.
    ///
    /// Returns the number removed.
    pub fn purge_older_than(&self, cutoff: Timestamp) -> usize {
        let before = self.documents.len();
        self.documents.retain(|_, doc| doc.updated_at >= cutoff);
        before.saturating_sub(self.documents.len())
    }
}

#[async_trait]
impl DurableStore for InMemoryDocumentStore {
    async fn load(&self, key: &str) -> Result<Option<DedupeRecord>, StoreError> {
        Ok(self.get(key))
    }

    async fn upsert(&self, key: &str, record: &DedupeRecord) -> Result<(), StoreError> {
        self.documents.insert(key.to_string(), record.clone());
        Ok(())
    }

    fn purge_older_than(&self, cutoff: Timestamp) -> Result<usize, StoreError> {
        Ok(InMemoryDocumentStore::purge_older_than(self, cutoff))
    }
}
