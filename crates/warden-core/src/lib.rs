//! # Warden Core
//!
//! The request-governance domain layer: tier policy registry, fixed-window
//! rate limit engine, and generic response cache. All coordination state
//! lives in an external key-value store reached through the [`ports::KeyStore`]
//! port; this crate holds no process-local counters or cache entries, so every
//! server instance observes the same decisions.

pub mod cache;
pub mod error;
pub mod limiter;
pub mod policy;
pub mod ports;
pub mod request_cache;

pub use error::ConfigError;
pub use policy::{EndpointClass, PolicyRegistry, RateLimitConfig, Tier, TierPolicy};

#[cfg(test)]
pub(crate) mod test_store;
