//! Rate limiting middleware - the admission side of the Governor.
//!
//! One governor instance guards one endpoint class. Authenticated callers are
//! counted per user id under their tier's budget; anonymous callers are
//! counted per client IP under the class's free-tier budget. When the key
//! store is unreachable the configured [`AdmissionPolicy`] decides between
//! admitting (fail-open, the default) and a 503 (fail-closed).

use std::future::{Future, Ready, ready};
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready};
use actix_web::http::header::{HeaderName, HeaderValue};
use actix_web::{Error, HttpResponse};

use warden_core::error::ConfigError;
use warden_core::limiter::{IpLimiter, RateLimitEngine, TieredLimiter};
use warden_core::policy::{EndpointClass, PolicyRegistry, Tier};
use warden_shared::ErrorBody;

use super::identity::{CallerIdentity, client_ip};

fn limit_header() -> HeaderName {
    HeaderName::from_static("x-ratelimit-limit")
}

fn remaining_header() -> HeaderName {
    HeaderName::from_static("x-ratelimit-remaining")
}

/// Post-response releases get their own short deadline so a hung store cannot
/// pile up detached tasks.
const RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

/// Behavior when the key store is unreachable during admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionPolicy {
    /// Admit and log: a limiter outage should not become a total outage.
    #[default]
    FailOpen,
    /// Deny with 503 until the store returns.
    FailClosed,
}

impl std::str::FromStr for AdmissionPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" | "fail-open" => Ok(AdmissionPolicy::FailOpen),
            "closed" | "fail-closed" => Ok(AdmissionPolicy::FailClosed),
            _ => Err(()),
        }
    }
}

/// Rate limiting middleware factory for one endpoint class.
#[derive(Clone)]
pub struct RateLimitGovernor {
    tiered: TieredLimiter,
    ip: IpLimiter,
    class: EndpointClass,
    admission: AdmissionPolicy,
}

impl RateLimitGovernor {
    /// Resolve the class's tier table at registration time. An unregistered
    /// class aborts startup here instead of failing per-request.
    pub fn new(
        engine: Arc<RateLimitEngine>,
        registry: &PolicyRegistry,
        class: EndpointClass,
        admission: AdmissionPolicy,
    ) -> Result<Self, ConfigError> {
        let policy = registry.policy_for(class)?.clone();
        let ip = IpLimiter::new(engine.clone(), class, policy.config(Tier::Free).clone());
        let tiered = TieredLimiter::new(engine, class, policy);
        Ok(Self {
            tiered,
            ip,
            class,
            admission,
        })
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitGovernor
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = GovernorMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(GovernorMiddleware {
            service: Rc::new(service),
            tiered: self.tiered.clone(),
            ip: self.ip.clone(),
            class: self.class,
            admission: self.admission,
        }))
    }
}

pub struct GovernorMiddleware<S> {
    service: Rc<S>,
    tiered: TieredLimiter,
    ip: IpLimiter,
    class: EndpointClass,
    admission: AdmissionPolicy,
}

impl<S, B> Service<ServiceRequest> for GovernorMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let tiered = self.tiered.clone();
        let ip = self.ip.clone();
        let class = self.class;
        let admission = self.admission;

        Box::pin(async move {
            // Authenticated: per-user budget for the caller's tier.
            // Anonymous: per-IP budget at the least privileged tier.
            let (identity, tier, config) = match CallerIdentity::resolve(&req) {
                Some(caller) => {
                    let config = tiered.config(caller.tier).clone();
                    (caller.id, Some(caller.tier), config)
                }
                None => (client_ip(&req), None, ip.config().clone()),
            };

            let checked = match tier {
                Some(t) => tiered.check(&identity, t).await,
                None => ip.check(&identity).await,
            };

            match checked {
                Ok(decision) if !decision.admitted => {
                    tracing::warn!(
                        identity = %identity,
                        class = %class,
                        retry_after_secs = decision.retry_after_secs(),
                        "rate limit exceeded"
                    );

                    let response = HttpResponse::TooManyRequests()
                        .insert_header((limit_header(), HeaderValue::from(decision.limit)))
                        .insert_header((remaining_header(), HeaderValue::from(0u32)))
                        .insert_header((
                            "Retry-After",
                            decision.retry_after_secs().to_string(),
                        ))
                        .json(ErrorBody::new(config.message.clone()));

                    let (http_req, _payload) = req.into_parts();
                    Ok(ServiceResponse::new(http_req, response).map_into_right_body())
                }
                Ok(decision) => {
                    match service.call(req).await {
                        Ok(mut res) => {
                            let headers = res.headers_mut();
                            headers.insert(limit_header(), HeaderValue::from(decision.limit));
                            headers
                                .insert(remaining_header(), HeaderValue::from(decision.remaining));

                            let status = res.status().as_u16();
                            if config.should_release(status) {
                                release_best_effort(tiered, ip, identity, tier);
                            }
                            Ok(res.map_into_left_body())
                        }
                        Err(err) => {
                            // The error path renders as a 5xx downstream.
                            if config.should_release(500) {
                                release_best_effort(tiered, ip, identity, tier);
                            }
                            Err(err)
                        }
                    }
                }
                Err(e) => match admission {
                    AdmissionPolicy::FailOpen => {
                        tracing::warn!(
                            error = %e,
                            class = %class,
                            "key store unreachable, admitting (fail-open)"
                        );
                        let res = service.call(req).await?;
                        Ok(res.map_into_left_body())
                    }
                    AdmissionPolicy::FailClosed => {
                        tracing::error!(
                            error = %e,
                            class = %class,
                            "key store unreachable, denying (fail-closed)"
                        );
                        let response = HttpResponse::ServiceUnavailable()
                            .json(ErrorBody::limiter_unavailable());
                        let (http_req, _payload) = req.into_parts();
                        Ok(ServiceResponse::new(http_req, response).map_into_right_body())
                    }
                },
            }
        })
    }
}

/// Fire-and-forget decrement on a detached task: it must still run when the
/// client has already disconnected, and a hung store must not leak work.
fn release_best_effort(tiered: TieredLimiter, ip: IpLimiter, identity: String, tier: Option<Tier>) {
    tokio::spawn(async move {
        let release = async {
            match tier {
                Some(t) => tiered.release(&identity, t).await,
                None => ip.release(&identity).await,
            }
        };
        match tokio::time::timeout(RELEASE_TIMEOUT, release).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, identity = %identity, "release failed"),
            Err(_) => tracing::debug!(identity = %identity, "release timed out"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{App, HttpRequest, test, web};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use warden_core::policy::{RateLimitConfig, TierPolicy};
    use warden_core::ports::{KeyStore, StoreError, StoreInfo};
    use warden_infra::InMemoryKeyStore;

    fn governor(
        store: Arc<dyn KeyStore>,
        registry: &PolicyRegistry,
        class: EndpointClass,
        admission: AdmissionPolicy,
    ) -> RateLimitGovernor {
        let engine = Arc::new(RateLimitEngine::new(store, "rl"));
        RateLimitGovernor::new(engine, registry, class, admission).unwrap()
    }

    async fn ok_handler() -> HttpResponse {
        HttpResponse::Ok().json(serde_json::json!({"ok": true}))
    }

    async fn failed_login() -> HttpResponse {
        HttpResponse::Unauthorized().json(ErrorBody::new("bad credentials"))
    }

    #[actix_web::test]
    async fn sixth_login_attempt_is_denied() {
        // AUTH_ENDPOINTS free tier: 5 per 15 minutes, keyed by IP here.
        let store = Arc::new(InMemoryKeyStore::new());
        let registry = PolicyRegistry::defaults();
        let gov = governor(
            store,
            &registry,
            EndpointClass::AuthEndpoints,
            AdmissionPolicy::FailOpen,
        );
        let app = test::init_service(
            App::new()
                .wrap(gov)
                .route("/login", web::post().to(failed_login)),
        )
        .await;

        for attempt in 1..=5 {
            let res = test::call_service(&app, test::TestRequest::post().uri("/login").to_request())
                .await;
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "attempt {attempt}");
        }

        let res =
            test::call_service(&app, test::TestRequest::post().uri("/login").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers().get("x-ratelimit-limit").unwrap(), "5");
        assert_eq!(res.headers().get("x-ratelimit-remaining").unwrap(), "0");
        let retry_after: u64 = res
            .headers()
            .get("retry-after")
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!(retry_after > 0 && retry_after <= 900);

        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["success"], serde_json::json!(false));
        assert!(body["error"].as_str().unwrap().contains("authentication"));
    }

    #[actix_web::test]
    async fn admitted_responses_carry_rate_limit_headers() {
        let store = Arc::new(InMemoryKeyStore::new());
        let registry = PolicyRegistry::defaults();
        let gov = governor(
            store,
            &registry,
            EndpointClass::ApiGeneral,
            AdmissionPolicy::FailOpen,
        );
        let app =
            test::init_service(App::new().wrap(gov).route("/", web::get().to(ok_handler))).await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get("x-ratelimit-limit").unwrap(), "100");
        assert_eq!(res.headers().get("x-ratelimit-remaining").unwrap(), "99");
    }

    #[actix_web::test]
    async fn tier_resolution_selects_the_caller_budget() {
        let store = Arc::new(InMemoryKeyStore::new());
        let registry = PolicyRegistry::defaults();
        let gov = governor(
            store,
            &registry,
            EndpointClass::ApiExpensive,
            AdmissionPolicy::FailOpen,
        );
        let app =
            test::init_service(App::new().wrap(gov).route("/", web::get().to(ok_handler))).await;

        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/")
                .insert_header(("x-user-id", "user-1"))
                .insert_header(("x-user-tier", "admin"))
                .to_request(),
        )
        .await;
        assert_eq!(res.headers().get("x-ratelimit-limit").unwrap(), "200");

        let res = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/")
                .insert_header(("x-user-id", "user-2"))
                .insert_header(("x-user-tier", "free"))
                .to_request(),
        )
        .await;
        assert_eq!(res.headers().get("x-ratelimit-limit").unwrap(), "10");
        // user-2 counts separately from user-1.
        assert_eq!(res.headers().get("x-ratelimit-remaining").unwrap(), "9");
    }

    #[actix_web::test]
    async fn successful_outcomes_are_released_when_configured() {
        // One-request budget with skip_successful: 200s never consume it,
        // the first failure does.
        let mut policies = HashMap::new();
        let config = RateLimitConfig::new(Duration::from_secs(3600), 1, "slow down")
            .skip_successful();
        policies.insert(
            EndpointClass::AuthEndpoints,
            TierPolicy {
                free: config.clone(),
                premium: config.clone(),
                admin: config,
            },
        );
        let registry = PolicyRegistry::new(policies).unwrap();

        let store = Arc::new(InMemoryKeyStore::new());
        let gov = governor(
            store,
            &registry,
            EndpointClass::AuthEndpoints,
            AdmissionPolicy::FailOpen,
        );

        async fn login(req: HttpRequest) -> HttpResponse {
            if req.query_string().contains("fail") {
                HttpResponse::Unauthorized().json(ErrorBody::new("bad credentials"))
            } else {
                HttpResponse::Ok().json(serde_json::json!({"ok": true}))
            }
        }

        let app =
            test::init_service(App::new().wrap(gov).route("/login", web::post().to(login))).await;

        for _ in 0..3 {
            let res = test::call_service(
                &app,
                test::TestRequest::post().uri("/login").to_request(),
            )
            .await;
            assert_eq!(res.status(), StatusCode::OK);
            // The release runs on a detached task; give it a beat.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let res = test::call_service(
            &app,
            test::TestRequest::post().uri("/login?fail=1").to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The failure stays in the window, so the budget is now spent.
        let res = test::call_service(
            &app,
            test::TestRequest::post().uri("/login").to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    /// Key store that is always down.
    struct DarkStore;

    #[async_trait]
    impl KeyStore for DarkStore {
        async fn incr_and_expire(&self, _: &str, _: Duration) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn decr_clamped(&self, _: &str) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn get(&self, _: &str) -> Result<Option<Vec<u8>>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn set_with_ttl(&self, _: &str, _: &[u8], _: Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn del(&self, _: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn expire(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn scan_delete(&self, _: &str) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn info(&self) -> Result<StoreInfo, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    #[actix_web::test]
    async fn store_outage_fails_open_by_default() {
        let registry = PolicyRegistry::defaults();
        let gov = governor(
            Arc::new(DarkStore),
            &registry,
            EndpointClass::ApiGeneral,
            AdmissionPolicy::FailOpen,
        );
        let app =
            test::init_service(App::new().wrap(gov).route("/", web::get().to(ok_handler))).await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn store_outage_fails_closed_when_configured() {
        let registry = PolicyRegistry::defaults();
        let gov = governor(
            Arc::new(DarkStore),
            &registry,
            EndpointClass::ApiGeneral,
            AdmissionPolicy::FailClosed,
        );
        let app =
            test::init_service(App::new().wrap(gov).route("/", web::get().to(ok_handler))).await;

        let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(
            body,
            serde_json::json!({"success": false, "error": "rate limiter unavailable"})
        );
    }
}
