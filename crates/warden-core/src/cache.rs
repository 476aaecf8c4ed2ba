//! Generic response cache over the key store.
//!
//! Caching is a performance optimization, never a correctness dependency:
//! reads fail soft (store outage and corrupt entries both read as a miss), so
//! no request is ever blocked by the cache layer.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::ports::{KeyStore, StoreError};

/// Cache operation errors. Only writes surface these; reads degrade to a miss.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Ephemeral statistics derived from the store's own introspection.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub keys: u64,
    pub memory_bytes: u64,
}

/// Prefix-scoped cache with JSON payloads and per-entry TTL.
pub struct CacheService {
    store: Arc<dyn KeyStore>,
    prefix: String,
    default_ttl: Duration,
}

impl CacheService {
    pub fn new(store: Arc<dyn KeyStore>, prefix: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Fetch and deserialize. Store errors and corrupt payloads are both a
    /// miss; corrupt entries are evicted so they cannot poison later reads.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full = self.full_key(key);
        let bytes = match self.store.get(&full).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %full, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %full, error = %e, "corrupt cache entry, evicting");
                if let Err(e) = self.store.del(&full).await {
                    tracing::debug!(key = %full, error = %e, "eviction of corrupt entry failed");
                }
                None
            }
        }
    }

    /// Serialize and store, overwriting any existing entry. `None` TTL uses
    /// the service default.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let bytes =
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.store
            .set_with_ttl(&self.full_key(key), &bytes, ttl.unwrap_or(self.default_ttl))
            .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.store.del(&self.full_key(key)).await?;
        Ok(())
    }

    /// Bulk invalidation by glob pattern, scoped to this service's prefix.
    pub async fn delete_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        let count = self.store.scan_delete(&self.full_key(pattern)).await?;
        tracing::debug!(pattern, count, "cache pattern invalidation");
        Ok(count)
    }

    pub async fn exists(&self, key: &str) -> bool {
        match self.store.get(&self.full_key(key)).await {
            Ok(found) => found.is_some(),
            Err(_) => false,
        }
    }

    /// Refresh a key's TTL without rewriting its value. Returns false if the
    /// key is gone.
    pub async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        Ok(self.store.expire(&self.full_key(key), ttl).await?)
    }

    /// Clear this service's entire keyspace. Never touches keys outside the
    /// prefix.
    pub async fn flush(&self) -> Result<u64, CacheError> {
        let count = self.store.scan_delete(&format!("{}:*", self.prefix)).await?;
        tracing::info!(prefix = %self.prefix, count, "cache flushed");
        Ok(count)
    }

    /// Store-level statistics; `None` when the store is unreachable.
    pub async fn stats(&self) -> Option<CacheStats> {
        match self.store.info().await {
            Ok(info) => Some(CacheStats {
                keys: info.keys,
                memory_bytes: info.memory_bytes,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "cache stats unavailable");
                None
            }
        }
    }
}
