//! # Warden Infrastructure
//!
//! Concrete implementations of the ports defined in `warden-core`.
//!
//! ## Feature Flags
//!
//! - `redis` (default) - Redis-backed key store, the production binding
//!
//! The in-memory key store is always available; it backs tests and serves as
//! a single-process fallback when Redis is not configured.

pub mod key_store;

pub use key_store::InMemoryKeyStore;

#[cfg(feature = "redis")]
pub use key_store::{RedisKeyStore, RedisKeyStoreConfig};
