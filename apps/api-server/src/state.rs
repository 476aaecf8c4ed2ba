//! Application state - shared across all handlers.

use std::sync::Arc;
use std::time::Duration;

use warden_core::cache::CacheService;
use warden_core::limiter::RateLimitEngine;
use warden_core::policy::PolicyRegistry;
use warden_core::ports::KeyStore;
use warden_core::request_cache::RequestCache;
use warden_infra::{InMemoryKeyStore, RedisKeyStore, RedisKeyStoreConfig};

use crate::config::AppConfig;
use crate::middleware::rate_limit::AdmissionPolicy;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KeyStore>,
    pub engine: Arc<RateLimitEngine>,
    pub registry: Arc<PolicyRegistry>,
    pub cache: Arc<CacheService>,
    pub request_cache: Arc<RequestCache>,
    pub admission: AdmissionPolicy,
}

impl AppState {
    /// Build the application state with the appropriate key store binding.
    pub async fn new(config: &AppConfig) -> Self {
        let store: Arc<dyn KeyStore> = match &config.redis_url {
            Some(url) => {
                let mut redis_config = RedisKeyStoreConfig::from_env();
                redis_config.url = url.clone();
                match RedisKeyStore::new(redis_config).await {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        tracing::error!(
                            "Failed to connect to Redis: {}. Using in-memory fallback; \
                             limits and cache are per-process until it returns.",
                            e
                        );
                        Arc::new(InMemoryKeyStore::new())
                    }
                }
            }
            None => {
                tracing::warn!(
                    "REDIS_URL not set. Running with in-memory key store (single-process mode)."
                );
                Arc::new(InMemoryKeyStore::new())
            }
        };

        let state = Self::with_store(
            store,
            &config.rate_limit_prefix,
            &config.cache_prefix,
            config.cache_ttl,
            config.admission,
        );
        tracing::info!("Application state initialized");
        state
    }

    /// Wire the governance components over an already-built store.
    pub fn with_store(
        store: Arc<dyn KeyStore>,
        rate_limit_prefix: &str,
        cache_prefix: &str,
        cache_ttl: Duration,
        admission: AdmissionPolicy,
    ) -> Self {
        let engine = Arc::new(RateLimitEngine::new(store.clone(), rate_limit_prefix));
        let registry = Arc::new(PolicyRegistry::defaults());
        let cache = Arc::new(CacheService::new(store.clone(), cache_prefix, cache_ttl));
        let request_cache = Arc::new(RequestCache::new(cache.clone(), cache_ttl));

        Self {
            store,
            engine,
            registry,
            cache,
            request_cache,
            admission,
        }
    }
}
