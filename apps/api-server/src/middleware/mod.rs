//! Middleware modules.

pub mod cache;
pub mod identity;
pub mod rate_limit;
