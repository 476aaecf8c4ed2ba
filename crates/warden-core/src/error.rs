//! Domain-level error types.

use thiserror::Error;

/// Configuration errors - fatal at startup/registration, never at request time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no policy registered for endpoint class '{0}'")]
    UnknownEndpointClass(&'static str),

    #[error("invalid rate limit config for '{class}': {detail}")]
    InvalidConfig {
        class: &'static str,
        detail: String,
    },

    #[error("tier ordering violated for '{class}': {detail}")]
    TierOrdering {
        class: &'static str,
        detail: String,
    },
}
