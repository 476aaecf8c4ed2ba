//! # Warden Shared
//!
//! Wire-level response envelopes shared between the server and its clients.
//! Every payload carries a `success` discriminator so clients can branch
//! without inspecting HTTP status codes.

pub mod response;

pub use response::{ApiResponse, ErrorBody};
