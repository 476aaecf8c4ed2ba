//! Cache administration endpoints: statistics, pattern invalidation, flush.

use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;

use warden_shared::{ApiResponse, ErrorBody};

use crate::state::AppState;

/// GET /api/admin/cache/stats
pub async fn stats(state: web::Data<AppState>) -> HttpResponse {
    match state.cache.stats().await {
        Some(stats) => HttpResponse::Ok().json(ApiResponse::ok(stats)),
        None => HttpResponse::ServiceUnavailable()
            .json(ErrorBody::new("cache statistics unavailable")),
    }
}

#[derive(Debug, Deserialize)]
pub struct InvalidateQuery {
    pub pattern: String,
}

/// DELETE /api/admin/cache/entries?pattern=GET:/api/courses*
pub async fn invalidate(
    state: web::Data<AppState>,
    query: web::Query<InvalidateQuery>,
) -> HttpResponse {
    match state.cache.delete_pattern(&query.pattern).await {
        Ok(count) => {
            tracing::info!(pattern = %query.pattern, count, "cache invalidation");
            HttpResponse::Ok().json(ApiResponse::ok(json!({ "invalidated": count })))
        }
        Err(e) => {
            tracing::error!(pattern = %query.pattern, error = %e, "cache invalidation failed");
            HttpResponse::ServiceUnavailable().json(ErrorBody::new("cache unavailable"))
        }
    }
}

/// POST /api/admin/cache/flush
pub async fn flush(state: web::Data<AppState>) -> HttpResponse {
    match state.cache.flush().await {
        Ok(count) => HttpResponse::Ok().json(ApiResponse::ok(json!({ "flushed": count }))),
        Err(e) => {
            tracing::error!(error = %e, "cache flush failed");
            HttpResponse::ServiceUnavailable().json(ErrorBody::new("cache unavailable"))
        }
    }
}
