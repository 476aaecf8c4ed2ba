//! Application configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use crate::middleware::rate_limit::AdmissionPolicy;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Shared key store; absent means single-process in-memory mode.
    pub redis_url: Option<String>,
    /// Key prefix for rate-limit counters.
    pub rate_limit_prefix: String,
    /// Key prefix for cache entries.
    pub cache_prefix: String,
    /// Default cache entry TTL.
    pub cache_ttl: Duration,
    /// What to do when the key store is unreachable during admission.
    pub admission: AdmissionPolicy,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            redis_url: env::var("REDIS_URL").ok(),
            rate_limit_prefix: env::var("RATE_LIMIT_KEY_PREFIX")
                .unwrap_or_else(|_| "ratelimit".to_string()),
            cache_prefix: env::var("CACHE_KEY_PREFIX").unwrap_or_else(|_| "cache".to_string()),
            cache_ttl: Duration::from_secs(
                env::var("CACHE_DEFAULT_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            admission: env::var("RATE_LIMIT_FAIL_MODE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
    }
}
