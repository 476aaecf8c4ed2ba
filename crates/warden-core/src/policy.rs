//! Tier policy registry - static configuration mapping endpoint classes and
//! caller tiers to limiter parameters. Pure lookup, no side effects.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Caller privilege class determining rate-limit generosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Premium,
    Admin,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Premium, Tier::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "premium" => Ok(Tier::Premium),
            "admin" => Ok(Tier::Admin),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical grouping of routes sharing one rate-limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointClass {
    ApiGeneral,
    ApiExpensive,
    ApiUploads,
    AuthEndpoints,
}

impl EndpointClass {
    pub const ALL: [EndpointClass; 4] = [
        EndpointClass::ApiGeneral,
        EndpointClass::ApiExpensive,
        EndpointClass::ApiUploads,
        EndpointClass::AuthEndpoints,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointClass::ApiGeneral => "api_general",
            EndpointClass::ApiExpensive => "api_expensive",
            EndpointClass::ApiUploads => "api_uploads",
            EndpointClass::AuthEndpoints => "auth_endpoints",
        }
    }
}

impl std::fmt::Display for EndpointClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limiter parameters for one (endpoint class, tier) cell. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Counting window length.
    pub window: Duration,
    /// Admitted requests per window.
    pub max: u32,
    /// Denial text returned with 429 responses.
    pub message: String,
    /// When true, successful outcomes do not count toward the window.
    pub skip_successful_requests: bool,
    /// When true, failed outcomes do not count toward the window.
    pub skip_failed_requests: bool,
}

impl RateLimitConfig {
    pub fn new(window: Duration, max: u32, message: impl Into<String>) -> Self {
        Self {
            window,
            max,
            message: message.into(),
            skip_successful_requests: false,
            skip_failed_requests: false,
        }
    }

    pub fn skip_successful(mut self) -> Self {
        self.skip_successful_requests = true;
        self
    }

    pub fn skip_failed(mut self) -> Self {
        self.skip_failed_requests = true;
        self
    }

    /// Whether a completed response with `status` should be released from the
    /// counter. A request is "successful" when its status is below 400.
    ///
    /// With both skip flags set, every outcome is released, so no request is
    /// ever recorded. The upstream behavior for that combination is
    /// unspecified; "never record any outcome" is the documented reading here.
    pub fn should_release(&self, status: u16) -> bool {
        let success = status < 400;
        (self.skip_successful_requests && success) || (self.skip_failed_requests && !success)
    }

    /// Admission rate in requests per second, used for tier-ordering checks.
    pub fn rate_per_sec(&self) -> f64 {
        self.max as f64 / self.window.as_secs_f64()
    }
}

/// Per-endpoint-class tier table. All three tiers are mandatory: a missing
/// tier never silently falls back to `free`.
#[derive(Debug, Clone, PartialEq)]
pub struct TierPolicy {
    pub free: RateLimitConfig,
    pub premium: RateLimitConfig,
    pub admin: RateLimitConfig,
}

impl TierPolicy {
    pub fn config(&self, tier: Tier) -> &RateLimitConfig {
        match tier {
            Tier::Free => &self.free,
            Tier::Premium => &self.premium,
            Tier::Admin => &self.admin,
        }
    }

    fn validate(&self, class: EndpointClass) -> Result<(), ConfigError> {
        for tier in Tier::ALL {
            let config = self.config(tier);
            if config.max == 0 || config.window.is_zero() {
                return Err(ConfigError::InvalidConfig {
                    class: class.as_str(),
                    detail: format!("tier '{tier}' requires positive max and window"),
                });
            }
        }
        // Privilege must buy throughput: free <= premium <= admin.
        if self.free.rate_per_sec() > self.premium.rate_per_sec() {
            return Err(ConfigError::TierOrdering {
                class: class.as_str(),
                detail: "free tier rate exceeds premium".to_string(),
            });
        }
        if self.premium.rate_per_sec() > self.admin.rate_per_sec() {
            return Err(ConfigError::TierOrdering {
                class: class.as_str(),
                detail: "premium tier rate exceeds admin".to_string(),
            });
        }
        Ok(())
    }
}

/// Registry of tier tables, validated at construction. Lookup failures are
/// configuration errors surfaced at route registration, never at request time.
#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: HashMap<EndpointClass, TierPolicy>,
}

impl PolicyRegistry {
    pub fn new(policies: HashMap<EndpointClass, TierPolicy>) -> Result<Self, ConfigError> {
        for (class, policy) in &policies {
            policy.validate(*class)?;
        }
        Ok(Self { policies })
    }

    /// The four endpoint classes that ship with default tier tables.
    pub fn defaults() -> Self {
        let mut policies = HashMap::new();

        policies.insert(
            EndpointClass::ApiGeneral,
            TierPolicy {
                free: RateLimitConfig::new(
                    Duration::from_secs(60),
                    100,
                    "Too many requests, please try again later",
                ),
                premium: RateLimitConfig::new(
                    Duration::from_secs(60),
                    500,
                    "Too many requests, please try again later",
                ),
                admin: RateLimitConfig::new(
                    Duration::from_secs(60),
                    2000,
                    "Too many requests, please try again later",
                ),
            },
        );

        policies.insert(
            EndpointClass::ApiExpensive,
            TierPolicy {
                free: RateLimitConfig::new(
                    Duration::from_secs(60),
                    10,
                    "This operation is rate limited, please slow down",
                ),
                premium: RateLimitConfig::new(
                    Duration::from_secs(60),
                    50,
                    "This operation is rate limited, please slow down",
                ),
                admin: RateLimitConfig::new(
                    Duration::from_secs(60),
                    200,
                    "This operation is rate limited, please slow down",
                ),
            },
        );

        policies.insert(
            EndpointClass::ApiUploads,
            TierPolicy {
                free: RateLimitConfig::new(
                    Duration::from_secs(3600),
                    20,
                    "Upload limit reached, please try again later",
                ),
                premium: RateLimitConfig::new(
                    Duration::from_secs(3600),
                    100,
                    "Upload limit reached, please try again later",
                ),
                admin: RateLimitConfig::new(
                    Duration::from_secs(3600),
                    500,
                    "Upload limit reached, please try again later",
                ),
            },
        );

        // Login window: only failed attempts count against the limit.
        policies.insert(
            EndpointClass::AuthEndpoints,
            TierPolicy {
                free: RateLimitConfig::new(
                    Duration::from_secs(900),
                    5,
                    "Too many authentication attempts, please try again later",
                )
                .skip_successful(),
                premium: RateLimitConfig::new(
                    Duration::from_secs(900),
                    10,
                    "Too many authentication attempts, please try again later",
                )
                .skip_successful(),
                admin: RateLimitConfig::new(
                    Duration::from_secs(900),
                    20,
                    "Too many authentication attempts, please try again later",
                )
                .skip_successful(),
            },
        );

        Self::new(policies).expect("default tier tables are valid")
    }

    pub fn register(
        &mut self,
        class: EndpointClass,
        policy: TierPolicy,
    ) -> Result<(), ConfigError> {
        policy.validate(class)?;
        self.policies.insert(class, policy);
        Ok(())
    }

    pub fn policy_for(&self, class: EndpointClass) -> Result<&TierPolicy, ConfigError> {
        self.policies
            .get(&class)
            .ok_or(ConfigError::UnknownEndpointClass(class.as_str()))
    }

    pub fn config_for(
        &self,
        class: EndpointClass,
        tier: Tier,
    ) -> Result<&RateLimitConfig, ConfigError> {
        Ok(self.policy_for(class)?.config(tier))
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::defaults()
    }
}
