//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod key_store;

pub use key_store::{KeyStore, StoreError, StoreInfo};
