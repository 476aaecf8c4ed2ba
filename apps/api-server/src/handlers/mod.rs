//! HTTP handlers and route configuration.

mod cache_admin;
mod catalog;
mod health;

use actix_web::web;

use warden_core::error::ConfigError;
use warden_core::policy::EndpointClass;

use crate::middleware::rate_limit::RateLimitGovernor;
use crate::state::AppState;

/// Per-class governors, resolved once at startup. A missing tier table
/// surfaces here as a `ConfigError` and aborts registration.
#[derive(Clone)]
pub struct Governors {
    pub general: RateLimitGovernor,
    pub expensive: RateLimitGovernor,
}

impl Governors {
    pub fn build(state: &AppState) -> Result<Self, ConfigError> {
        Ok(Self {
            general: RateLimitGovernor::new(
                state.engine.clone(),
                &state.registry,
                EndpointClass::ApiGeneral,
                state.admission,
            )?,
            expensive: RateLimitGovernor::new(
                state.engine.clone(),
                &state.registry,
                EndpointClass::ApiExpensive,
                state.admission,
            )?,
        })
    }
}

/// Configure all application routes, each scope behind its class's governor.
pub fn configure_routes(cfg: &mut web::ServiceConfig, governors: &Governors) {
    cfg.service(
        web::scope("/api")
            .service(
                web::scope("/admin/cache")
                    .wrap(governors.expensive.clone())
                    .route("/stats", web::get().to(cache_admin::stats))
                    .route("/entries", web::delete().to(cache_admin::invalidate))
                    .route("/flush", web::post().to(cache_admin::flush)),
            )
            .service(
                web::scope("")
                    .wrap(governors.general.clone())
                    .route("/health", web::get().to(health::health_check))
                    .route("/courses", web::get().to(catalog::list_courses)),
            ),
    );
}
