//! Request-level caching built on [`CacheService`].
//!
//! Wraps a downstream handler for idempotent read operations: hit
//! short-circuits with the stored payload, miss runs the handler and stores
//! its result when (and only when) it is a 2xx. Concurrent misses for the
//! same key are not deduplicated; each one runs the handler independently.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheService;

/// What the cache needs to know about an inbound request.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
}

/// Strategy for deriving a cache key from a request.
pub trait KeyGenerator: Send + Sync {
    fn cache_key(&self, meta: &RequestMeta) -> String;
}

/// Default key derivation: method + path + sorted query pairs. Sorting makes
/// the key stable under query parameter reordering.
pub struct DefaultKeyGenerator;

impl KeyGenerator for DefaultKeyGenerator {
    fn cache_key(&self, meta: &RequestMeta) -> String {
        let mut query = meta.query.clone();
        query.sort();
        if query.is_empty() {
            format!("{}:{}", meta.method, meta.path)
        } else {
            let qs = query
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&");
            format!("{}:{}?{}", meta.method, meta.path, qs)
        }
    }
}

/// A downstream handler's result: status plus JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl HandlerResponse {
    pub fn ok(body: serde_json::Value) -> Self {
        Self { status: 200, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A handler response plus whether it came from the cache.
#[derive(Debug, Clone)]
pub struct CachedOutcome {
    pub response: HandlerResponse,
    pub hit: bool,
}

/// Cache wrapper around downstream handlers.
pub struct RequestCache {
    cache: Arc<CacheService>,
    key_gen: Arc<dyn KeyGenerator>,
    ttl: Duration,
}

impl RequestCache {
    pub fn new(cache: Arc<CacheService>, ttl: Duration) -> Self {
        Self {
            cache,
            key_gen: Arc::new(DefaultKeyGenerator),
            ttl,
        }
    }

    pub fn with_key_generator(mut self, key_gen: Arc<dyn KeyGenerator>) -> Self {
        self.key_gen = key_gen;
        self
    }

    pub fn cache_key(&self, meta: &RequestMeta) -> String {
        self.key_gen.cache_key(meta)
    }

    /// Consult the cache; on miss run `handler` and store a 2xx result.
    pub async fn wrap<F, Fut>(&self, meta: &RequestMeta, handler: F) -> CachedOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = HandlerResponse>,
    {
        let key = self.key_gen.cache_key(meta);

        if let Some(response) = self.cache.get::<HandlerResponse>(&key).await {
            tracing::debug!(key = %key, "request cache hit");
            return CachedOutcome {
                response,
                hit: true,
            };
        }

        let response = handler().await;
        if response.is_success() {
            if let Err(e) = self.cache.set(&key, &response, Some(self.ttl)).await {
                tracing::warn!(key = %key, error = %e, "failed to store response in cache");
            }
        }

        CachedOutcome {
            response,
            hit: false,
        }
    }
}
