//! Redis-backed durable store.
//!
//! Lets every instance of a fleet see the outcomes the others recorded.
//!
//! ## Layout
//!
//! - Keys: the fingerprint with a configurable prefix
//! - Values: the JSON document `{ "payload": ..., "updatedAt": <epoch ms> }`
//! - Expiry: `SET EX` so abandoned documents disappear on their own
//!
//! Connection errors surface as [`StoreError::Unavailable`]; the dedupe layer
//! above logs them and fails open. Documents that no longer decode are
//! deleted and read as absent.
//!
//! ## Example
//!
//! ```rust,ignore
//! use admission_gate::{AdmissionGate, RedisDocumentStore, RedisStoreConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = RedisDocumentStore::connect_with_config(
//!         "redis://127.0.0.1/",
//!         RedisStoreConfig::default(),
//!     )
//!     .await
//!     .expect("Failed to connect to Redis");
//!
//!     let gate = AdmissionGate::builder()
//!         .with_store(Arc::new(store))
//!         .build()
//!         .unwrap();
//! }
//! ```

use crate::application::ports::{DedupeRecord, DurableStore, StoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use std::fmt;
use std::time::Duration;

/// Configuration for the Redis store.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Key prefix for Redis keys (default: "admission-gate:")
    pub key_prefix: String,
    /// Expiry for stored documents (default: 1 hour)
    ///
    /// Should be at least the dedupe TTL, or fresh records vanish early.
    pub expiry: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "admission-gate:".to_string(),
            expiry: Duration::from_secs(3600),
        }
    }
}

/// Durable store backed by Redis.
#[derive(Clone)]
pub struct RedisDocumentStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
}

impl fmt::Debug for RedisDocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisDocumentStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

impl RedisDocumentStore {
    /// Connect to Redis with default configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisStoreConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect_with_config(
        url: &str,
        config: RedisStoreConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self { connection, config })
    }

    /// Get the store configuration.
    pub fn config(&self) -> &RedisStoreConfig {
        &self.config
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// Delete every document under the configured prefix.
    ///
    /// # Errors
    /// Returns error if a SCAN or DEL fails.
    pub async fn clear(&self) -> Result<(), StoreError> {
        let pattern = format!("{}*", self.config.key_prefix);
        let mut conn = self.connection.clone();
        let mut cursor: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                conn.del::<_, ()>(&keys).await?;
            }
            if next == 0 {
                return Ok(());
            }
            cursor = next;
        }
    }
}

#[async_trait]
impl DurableStore for RedisDocumentStore {
    async fn load(&self, key: &str) -> Result<Option<DedupeRecord>, StoreError> {
        let redis_key = self.key(key);
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn.get(&redis_key).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str::<DedupeRecord>(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(key = %redis_key, error = %e, "deleting malformed durable document");
                conn.del::<_, ()>(&redis_key).await?;
                Ok(None)
            }
        }
    }

    async fn upsert(&self, key: &str, record: &DedupeRecord) -> Result<(), StoreError> {
        let document =
            serde_json::to_string(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut conn = self.connection.clone();
        let expiry_secs = self.config.expiry.as_secs().max(1);

        conn.set_ex::<_, _, ()>(self.key(key), document, expiry_secs)
            .await?;
        Ok(())
    }
}
