//! Key-value store port.
//!
//! The store is the single source of truth shared by every server instance:
//! rate-limit counters and cache entries live here, never in process memory.

use async_trait::async_trait;
use std::time::Duration;

/// Store introspection snapshot, used for cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreInfo {
    pub keys: u64,
    pub memory_bytes: u64,
}

/// Key store errors.
///
/// Connectivity failures must surface as [`StoreError::Unavailable`] - never
/// as silently returned defaults. A timed-out call is reported the same way.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key store unavailable: {0}")]
    Unavailable(String),

    #[error("key store operation failed: {0}")]
    Backend(String),
}

/// Atomic key-value store abstraction.
///
/// Implementations must guarantee that [`incr_and_expire`](KeyStore::incr_and_expire)
/// is a single atomic round trip: increment-then-separately-set-TTL would leave
/// a key without expiry if the process crashed between the two calls.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Atomically increment `key` and return the post-increment value.
    /// The TTL is set iff this increment created the key.
    async fn incr_and_expire(&self, key: &str, ttl: Duration) -> Result<i64, StoreError>;

    /// Decrement `key`, clamping at zero. Missing keys read as zero.
    async fn decr_clamped(&self, key: &str) -> Result<i64, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration)
    -> Result<(), StoreError>;

    async fn del(&self, key: &str) -> Result<(), StoreError>;

    /// Refresh the TTL on an existing key without rewriting its value.
    /// Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete all keys matching a glob pattern via an incremental scan.
    /// Implementations must never issue one blocking full-keyspace sweep.
    async fn scan_delete(&self, pattern: &str) -> Result<u64, StoreError>;

    async fn info(&self) -> Result<StoreInfo, StoreError>;
}
