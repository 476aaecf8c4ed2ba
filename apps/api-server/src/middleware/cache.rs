//! Actix binding for the request cache - the caching side of the Governor.
//!
//! Cacheable read handlers run through [`RequestCache::wrap`]; this module
//! translates between actix requests/responses and the framework-agnostic
//! contract in `warden-core`.

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse};

use warden_core::request_cache::{CachedOutcome, RequestMeta};

/// Marker header telling clients (and tests) whether the response was served
/// from the cache.
pub const CACHE_MARKER: &str = "x-cache";

/// Extract what the key generator needs from an actix request.
pub fn request_meta(req: &HttpRequest) -> RequestMeta {
    let query = req
        .query_string()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect();

    RequestMeta {
        method: req.method().as_str().to_string(),
        path: req.path().to_string(),
        query,
    }
}

/// Render a cached outcome as an HTTP response with the cache marker set.
pub fn respond(outcome: CachedOutcome) -> HttpResponse {
    let status =
        StatusCode::from_u16(outcome.response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status)
        .insert_header((CACHE_MARKER, if outcome.hit { "HIT" } else { "MISS" }))
        .json(outcome.response.body)
}
