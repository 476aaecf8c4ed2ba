//! In-memory key store - used by tests and as a single-process fallback when
//! Redis is unavailable. Counters and cache entries share one map, mirroring
//! the Redis keyspace semantics (integer values stored as ASCII).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use warden_core::ports::{KeyStore, StoreError, StoreInfo};

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() > at)
    }

    fn as_int(&self) -> i64 {
        std::str::from_utf8(&self.value)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }
}

/// HashMap-backed [`KeyStore`] behind an async RwLock.
///
/// Note: state is per-process; multi-instance deployments need the Redis
/// binding for consistent decisions.
pub struct InMemoryKeyStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn incr_and_expire(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key).filter(|e| !e.expired()) {
            Some(entry) => {
                let next = entry.as_int() + 1;
                entry.value = next.to_string().into_bytes();
                Ok(next)
            }
            None => {
                // First write in this window creates the key and its TTL in
                // one step, under the same lock.
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: b"1".to_vec(),
                        expires_at: Some(Instant::now() + ttl),
                    },
                );
                Ok(1)
            }
        }
    }

    async fn decr_clamped(&self, key: &str) -> Result<i64, StoreError> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key).filter(|e| !e.expired()) {
            Some(entry) => {
                let next = (entry.as_int() - 1).max(0);
                entry.value = next.to_string().into_bytes();
                Ok(next)
            }
            None => Ok(0),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.expired() => Ok(Some(entry.value.clone())),
            Some(_) => {
                drop(entries);
                self.entries.write().await.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key).filter(|e| !e.expired()) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan_delete(&self, pattern: &str) -> Result<u64, StoreError> {
        let mut entries = self.entries.write().await;
        let mut removed = 0u64;
        entries.retain(|key, entry| {
            if glob_match(pattern, key) {
                // Expired-but-matching keys were already dead: drop them
                // without counting.
                if !entry.expired() {
                    removed += 1;
                }
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn info(&self) -> Result<StoreInfo, StoreError> {
        let entries = self.entries.read().await;
        let live: Vec<_> = entries.iter().filter(|(_, e)| !e.expired()).collect();
        let memory: usize = live.iter().map(|(k, e)| k.len() + e.value.len()).sum();
        Ok(StoreInfo {
            keys: live.len() as u64,
            memory_bytes: memory as u64,
        })
    }
}

/// Redis-style glob matching, supporting `*` and `?`.
fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();
    // Two-pointer match with backtracking to the last `*`.
    let (mut pi, mut ki) = (0usize, 0usize);
    let (mut star, mut mark) = (None::<usize>, 0usize);

    while ki < k.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == k[ki]) {
            pi += 1;
            ki += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ki;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ki = mark;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
