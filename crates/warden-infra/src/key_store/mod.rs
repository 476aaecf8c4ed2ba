//! Key store implementations - Redis and in-memory fallback.

mod memory;

pub use memory::InMemoryKeyStore;

#[cfg(feature = "redis")]
mod redis;
#[cfg(feature = "redis")]
pub use self::redis::{RedisKeyStore, RedisKeyStoreConfig};
