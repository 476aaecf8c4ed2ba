//! Redis key store implementation.
//!
//! Counter updates run as Lua scripts so increment and TTL assignment (and
//! decrement clamping) are each one atomic round trip. Pattern deletion uses
//! an incremental SCAN loop, never a blocking KEYS sweep. Every operation is
//! bounded by a timeout; a timed-out call reads as the store being down.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use warden_core::ports::{KeyStore, StoreError, StoreInfo};

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisKeyStoreConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Per-operation timeout; expiry is treated as `StoreError::Unavailable`
    pub op_timeout: Duration,
    /// Batch size hint for SCAN-based deletion
    pub scan_count: u32,
}

impl Default for RedisKeyStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            op_timeout: Duration::from_secs(2),
            scan_count: 100,
        }
    }
}

impl RedisKeyStoreConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(
                std::env::var("REDIS_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
            op_timeout: Duration::from_millis(
                std::env::var("REDIS_OP_TIMEOUT_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            ),
            scan_count: std::env::var("REDIS_SCAN_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
        }
    }
}

/// Redis-backed [`KeyStore`].
///
/// Uses connection manager for automatic reconnection and pooling.
pub struct RedisKeyStore {
    conn: ConnectionManager,
    config: RedisKeyStoreConfig,
    incr_script: Script,
    decr_script: Script,
}

impl RedisKeyStore {
    pub async fn new(config: RedisKeyStoreConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| StoreError::Unavailable("connection timed out".to_string()))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        // Increment and set TTL iff this write created the key, in one
        // transaction.
        let incr_script = Script::new(
            r#"
            local current = redis.call('INCR', KEYS[1])
            if current == 1 then
                redis.call('PEXPIRE', KEYS[1], ARGV[1])
            end
            return current
            "#,
        );

        // Decrement clamped at zero; a missing key stays missing.
        let decr_script = Script::new(
            r#"
            if redis.call('EXISTS', KEYS[1]) == 0 then
                return 0
            end
            local current = redis.call('DECR', KEYS[1])
            if current < 0 then
                redis.call('SET', KEYS[1], '0', 'KEEPTTL')
                current = 0
            end
            return current
            "#,
        );

        tracing::info!(url = %config.url, "Connected to Redis key store");

        Ok(Self {
            conn,
            config,
            incr_script,
            decr_script,
        })
    }

    /// Create from environment configuration.
    pub async fn from_env() -> Result<Self, StoreError> {
        Self::new(RedisKeyStoreConfig::from_env()).await
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.config.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify(e)),
            Err(_) => Err(StoreError::Unavailable("operation timed out".to_string())),
        }
    }
}

fn classify(e: redis::RedisError) -> StoreError {
    if e.is_io_error()
        || e.is_timeout()
        || e.is_connection_refusal()
        || e.is_connection_dropped()
    {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
impl KeyStore for RedisKeyStore {
    async fn incr_and_expire(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded(
            self.incr_script
                .key(key)
                .arg(ttl.as_millis() as u64)
                .invoke_async::<i64>(&mut conn),
        )
        .await
    }

    async fn decr_clamped(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded(self.decr_script.key(key).invoke_async::<i64>(&mut conn))
            .await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.get::<_, Option<Vec<u8>>>(key)).await
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.pset_ex::<_, _, ()>(key, value, ttl.as_millis() as u64))
            .await
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.del::<_, ()>(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let updated: i64 = self
            .bounded(conn.pexpire(key, ttl.as_millis() as i64))
            .await?;
        Ok(updated == 1)
    }

    async fn scan_delete(&self, pattern: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted: u64 = 0;

        // Cursor-driven SCAN keeps each round trip small so the shared store
        // is never stalled by one large keyspace.
        loop {
            let (next, keys): (u64, Vec<String>) = self
                .bounded(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(self.config.scan_count)
                        .query_async(&mut conn),
                )
                .await?;

            if !keys.is_empty() {
                deleted += self.bounded(conn.del::<_, u64>(keys)).await?;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        Ok(deleted)
    }

    async fn info(&self) -> Result<StoreInfo, StoreError> {
        let mut conn = self.conn.clone();
        let keys: u64 = self
            .bounded(redis::cmd("DBSIZE").query_async(&mut conn))
            .await?;
        let raw: String = self
            .bounded(redis::cmd("INFO").arg("memory").query_async(&mut conn))
            .await?;
        let memory_bytes = raw
            .lines()
            .find_map(|line| line.strip_prefix("used_memory:"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);

        Ok(StoreInfo { keys, memory_bytes })
    }
}
