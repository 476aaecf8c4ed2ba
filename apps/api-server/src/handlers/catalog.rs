//! Catalog listing - a cacheable read route.
//!
//! The listing itself is a stand-in for a database-backed query; what matters
//! here is the wiring: the handler runs through the request cache, so repeat
//! reads within the TTL are served from the key store.

use actix_web::{HttpRequest, HttpResponse, web};
use serde_json::json;

use warden_core::request_cache::HandlerResponse;

use crate::middleware::cache::{request_meta, respond};
use crate::state::AppState;

/// GET /api/courses
pub async fn list_courses(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    let meta = request_meta(&req);
    let outcome = state
        .request_cache
        .wrap(&meta, || async {
            HandlerResponse::ok(json!({
                "courses": [
                    { "id": 1, "title": "Foundations" },
                    { "id": 2, "title": "Distributed Systems" },
                    { "id": 3, "title": "Applied Cryptography" },
                ]
            }))
        })
        .await;

    respond(outcome)
}
