//! Test double for the [`KeyStore`] port used by unit tests in this crate.
//! The real adapters live in `warden-infra`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::ports::{KeyStore, StoreError, StoreInfo};

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() > at)
    }
}

#[derive(Default)]
pub struct StubStore {
    entries: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl StubStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`.
    pub fn go_dark(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub fn counter(&self, key: &str) -> i64 {
        let entries = self.entries.lock().unwrap();
        entries
            .get(key)
            .filter(|e| !e.expired())
            .and_then(|e| std::str::from_utf8(&e.value).ok()?.parse().ok())
            .unwrap_or(0)
    }

    fn check_up(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("stub store is dark".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KeyStore for StubStore {
    async fn incr_and_expire(&self, key: &str, ttl: Duration) -> Result<i64, StoreError> {
        self.check_up()?;
        let mut entries = self.entries.lock().unwrap();
        let current = entries
            .get(key)
            .filter(|e| !e.expired())
            .and_then(|e| std::str::from_utf8(&e.value).ok()?.parse::<i64>().ok());
        let next = current.unwrap_or(0) + 1;
        let expires_at = match entries.get(key).filter(|e| !e.expired()) {
            Some(existing) => existing.expires_at,
            None => Some(Instant::now() + ttl),
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: next.to_string().into_bytes(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn decr_clamped(&self, key: &str) -> Result<i64, StoreError> {
        self.check_up()?;
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(key).filter(|e| !e.expired()) else {
            return Ok(0);
        };
        let current: i64 = std::str::from_utf8(&entry.value)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let next = (current - 1).max(0);
        entry.value = next.to_string().into_bytes();
        Ok(next)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_up()?;
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .get(key)
            .filter(|e| !e.expired())
            .map(|e| e.value.clone()))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.check_up()?;
        let mut entries = self.entries.lock().unwrap();
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
        self.check_up()?;
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.check_up()?;
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(key).filter(|e| !e.expired()) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn scan_delete(&self, pattern: &str) -> Result<u64, StoreError> {
        self.check_up()?;
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        Ok((before - entries.len()) as u64)
    }

    async fn info(&self) -> Result<StoreInfo, StoreError> {
        self.check_up()?;
        let entries = self.entries.lock().unwrap();
        let live = entries.values().filter(|e| !e.expired()).count() as u64;
        let memory: usize = entries
            .iter()
            .filter(|(_, e)| !e.expired())
            .map(|(k, e)| k.len() + e.value.len())
            .sum();
        Ok(StoreInfo {
            keys: live,
            memory_bytes: memory as u64,
        })
    }
}

fn glob_match(pattern: &str, key: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == key,
        Some((prefix, rest)) => {
            key.starts_with(prefix)
                && (rest.is_empty()
                    || key[prefix.len()..]
                        .char_indices()
                        .any(|(i, _)| glob_match(rest, &key[prefix.len() + i..])))
        }
    }
}
