//! Fixed-window rate limit engine.
//!
//! One parameterized `check`/`release` core shared by three call-site flavors
//! (tiered, IP, custom) that differ only in identity derivation and config
//! resolution. Counters are fixed-window, not a sliding log: resets happen
//! exactly at window boundaries, trading boundary bursts for O(1) memory and
//! single-op atomicity.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::policy::{EndpointClass, RateLimitConfig, Tier, TierPolicy};
use crate::ports::{KeyStore, StoreError};

/// Outcome of a rate limit check. A denial is control flow, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub admitted: bool,
    /// Window capacity, for the `X-RateLimit-Limit` header.
    pub limit: u32,
    /// Requests left in this window, for the `X-RateLimit-Remaining` header.
    pub remaining: u32,
    /// Time until the window resets; zero when admitted.
    pub retry_after: Duration,
}

impl Decision {
    /// `Retry-After` header value in whole seconds, rounded up.
    pub fn retry_after_secs(&self) -> u64 {
        self.retry_after.as_millis().div_ceil(1000) as u64
    }
}

/// The shared check/release primitives over the key store.
pub struct RateLimitEngine {
    store: Arc<dyn KeyStore>,
    key_prefix: String,
}

impl RateLimitEngine {
    pub fn new(store: Arc<dyn KeyStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
        }
    }

    fn counter_key(&self, class: EndpointClass, identity: &str, bucket: u128) -> String {
        format!("{}:{}:{}:{}", self.key_prefix, class.as_str(), identity, bucket)
    }

    /// Atomically count this request against `(class, identity)` for the
    /// current window and decide admission.
    pub async fn check(
        &self,
        identity: &str,
        class: EndpointClass,
        config: &RateLimitConfig,
    ) -> Result<Decision, StoreError> {
        let window_ms = config.window.as_millis().max(1);
        let now = now_ms();
        let bucket = now / window_ms;
        let key = self.counter_key(class, identity, bucket);

        // Single round trip: the store sets the TTL iff this increment
        // created the key, so concurrent first-requests cannot race on it.
        let count = self.store.incr_and_expire(&key, config.window).await?;

        if count <= i64::from(config.max) {
            Ok(Decision {
                admitted: true,
                limit: config.max,
                remaining: config.max - count as u32,
                retry_after: Duration::ZERO,
            })
        } else {
            let reset_in = (bucket + 1) * window_ms - now;
            tracing::debug!(
                identity,
                class = %class,
                count,
                max = config.max,
                "rate limit exceeded"
            );
            Ok(Decision {
                admitted: false,
                limit: config.max,
                remaining: 0,
                retry_after: Duration::from_millis(reset_in as u64),
            })
        }
    }

    /// Remove one request from the current window's counter, clamped at zero.
    /// Called after the response outcome is known when the config's skip
    /// flags say this outcome should not count.
    pub async fn release(
        &self,
        identity: &str,
        class: EndpointClass,
        config: &RateLimitConfig,
    ) -> Result<(), StoreError> {
        let window_ms = config.window.as_millis().max(1);
        let bucket = now_ms() / window_ms;
        let key = self.counter_key(class, identity, bucket);
        self.store.decr_clamped(&key).await?;
        Ok(())
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Limiter for authenticated traffic: identity is the user id, config is
/// resolved from the caller's tier in a per-class tier table.
#[derive(Clone)]
pub struct TieredLimiter {
    engine: Arc<RateLimitEngine>,
    class: EndpointClass,
    policy: TierPolicy,
}

impl TieredLimiter {
    pub fn new(engine: Arc<RateLimitEngine>, class: EndpointClass, policy: TierPolicy) -> Self {
        Self {
            engine,
            class,
            policy,
        }
    }

    pub fn config(&self, tier: Tier) -> &RateLimitConfig {
        self.policy.config(tier)
    }

    pub async fn check(&self, user_id: &str, tier: Tier) -> Result<Decision, StoreError> {
        self.engine
            .check(user_id, self.class, self.policy.config(tier))
            .await
    }

    pub async fn release(&self, user_id: &str, tier: Tier) -> Result<(), StoreError> {
        self.engine
            .release(user_id, self.class, self.policy.config(tier))
            .await
    }
}

/// Limiter for unauthenticated traffic: identity is the client IP, one
/// implicit tier.
#[derive(Clone)]
pub struct IpLimiter {
    engine: Arc<RateLimitEngine>,
    class: EndpointClass,
    config: RateLimitConfig,
}

impl IpLimiter {
    pub fn new(engine: Arc<RateLimitEngine>, class: EndpointClass, config: RateLimitConfig) -> Self {
        Self {
            engine,
            class,
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub async fn check(&self, ip: &str) -> Result<Decision, StoreError> {
        self.engine.check(ip, self.class, &self.config).await
    }

    pub async fn release(&self, ip: &str) -> Result<(), StoreError> {
        self.engine.release(ip, self.class, &self.config).await
    }
}

/// Limiter with caller-supplied window/max/message, identity = user id.
#[derive(Clone)]
pub struct CustomLimiter {
    engine: Arc<RateLimitEngine>,
    class: EndpointClass,
    config: RateLimitConfig,
}

impl CustomLimiter {
    pub fn new(engine: Arc<RateLimitEngine>, class: EndpointClass, config: RateLimitConfig) -> Self {
        Self {
            engine,
            class,
            config,
        }
    }

    pub async fn check(&self, user_id: &str) -> Result<Decision, StoreError> {
        self.engine.check(user_id, self.class, &self.config).await
    }

    pub async fn release(&self, user_id: &str) -> Result<(), StoreError> {
        self.engine.release(user_id, self.class, &self.config).await
    }
}
