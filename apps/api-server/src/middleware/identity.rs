//! Caller identity resolution.
//!
//! Authentication happens upstream (gateway or auth middleware); this module
//! only consumes the already-resolved identity. Callers without one take the
//! IP-based limiter path.

use actix_web::HttpMessage;
use actix_web::dev::ServiceRequest;
use actix_web::http::header::HeaderMap;

use warden_core::policy::Tier;

/// An authenticated caller: opaque user id plus resolved tier.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub id: String,
    pub tier: Tier,
}

impl CallerIdentity {
    /// Resolve the caller for a request: request extensions first (set by an
    /// in-process auth middleware), then the trusted gateway headers.
    pub fn resolve(req: &ServiceRequest) -> Option<Self> {
        if let Some(identity) = req.extensions().get::<CallerIdentity>() {
            return Some(identity.clone());
        }
        Self::from_headers(req.headers())
    }

    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let id = headers.get("x-user-id")?.to_str().ok()?.trim();
        if id.is_empty() {
            return None;
        }
        let raw_tier = headers.get("x-user-tier")?.to_str().ok()?;
        match raw_tier.parse::<Tier>() {
            Ok(tier) => Some(Self {
                id: id.to_string(),
                tier,
            }),
            Err(()) => {
                // An unrecognized tier is not trusted; fall back to the
                // unauthenticated path rather than guessing a budget.
                tracing::warn!(tier = %raw_tier, "unrecognized caller tier, treating as anonymous");
                None
            }
        }
    }
}

/// Client address used as the identity for unauthenticated callers.
pub fn client_ip(req: &ServiceRequest) -> String {
    req.connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string()
}
