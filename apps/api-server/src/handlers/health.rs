//! Health check endpoint.

use actix_web::{HttpResponse, web};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Reachability of the shared key store; "degraded" means rate limiting
    /// and caching are running on local fallbacks.
    pub key_store: &'static str,
}

/// Health check endpoint - returns server and store status.
///
/// GET /api/health
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let key_store = match state.store.info().await {
        Ok(_) => "up",
        Err(_) => "degraded",
    };

    let response = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        key_store,
    };

    HttpResponse::Ok().json(response)
}
