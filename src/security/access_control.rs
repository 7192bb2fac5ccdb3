//! Access control: token validation glue and policy evaluation.
//!
//! # Responsibilities
//! - Extract the bearer token and hand it to the external validator
//! - Map validated claims to a `CallerIdentity` with a tier
//! - Evaluate named policies (admin-only, premium-access)
//!
//! # Design Decisions
//! - Signature/issuer/expiry checks live in the external collaborator,
//!   not here; this layer only maps claims and evaluates policy
//! - Tiers are totally ordered so route checks are a single comparison
//! - When auth is disabled every request runs as an anonymous
//!   standard-tier caller (passthrough mode)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::config::schema::AuthConfig;
use crate::error::GatewayError;

/// Caller tier, ordered from least to most privileged.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Standard,
    Premium,
    Admin,
}

/// Claims returned by the external token validator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidatedClaims {
    pub subject: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Request-scoped caller identity, derived once from validated claims.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub subject: String,
    pub roles: Vec<String>,
    pub tier: Tier,
}

impl CallerIdentity {
    /// Anonymous identity used when authentication is disabled.
    pub fn anonymous() -> Self {
        Self {
            subject: "anonymous".to_string(),
            roles: Vec::new(),
            tier: Tier::Standard,
        }
    }

    pub fn from_claims(claims: ValidatedClaims) -> Self {
        let tier = tier_from_roles(&claims.roles);
        Self {
            subject: claims.subject,
            roles: claims.roles,
            tier,
        }
    }
}

/// Derive the tier from role claims. Admin beats premium beats standard.
fn tier_from_roles(roles: &[String]) -> Tier {
    let mut tier = Tier::Standard;
    for role in roles {
        match role.to_ascii_lowercase().as_str() {
            "admin" => return Tier::Admin,
            "premium" => tier = Tier::Premium,
            _ => {}
        }
    }
    tier
}

/// Named authorization policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Requires the Admin role.
    AdminOnly,
    /// Requires Premium or Admin.
    PremiumAccess,
}

/// External token validation collaborator.
pub trait TokenValidator: Send + Sync {
    fn validate<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<ValidatedClaims, GatewayError>>;
}

/// Validator backed by a static token table from configuration.
/// Intended for development and tests.
pub struct StaticTokenValidator {
    tokens: HashMap<String, ValidatedClaims>,
}

impl StaticTokenValidator {
    pub fn new(tokens: HashMap<String, ValidatedClaims>) -> Self {
        Self { tokens }
    }
}

impl TokenValidator for StaticTokenValidator {
    fn validate<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<ValidatedClaims, GatewayError>> {
        let result = self
            .tokens
            .get(token)
            .cloned()
            .ok_or(GatewayError::Unauthenticated);
        Box::pin(async move { result })
    }
}

/// Validator that POSTs the token to a remote introspection endpoint.
pub struct RemoteTokenValidator {
    url: String,
    client: reqwest::Client,
}

impl RemoteTokenValidator {
    pub fn new(url: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { url, client }
    }
}

impl TokenValidator for RemoteTokenValidator {
    fn validate<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<ValidatedClaims, GatewayError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(&serde_json::json!({ "token": token }))
                .send()
                .await
                .map_err(|_| GatewayError::Unauthenticated)?;

            if !response.status().is_success() {
                return Err(GatewayError::Unauthenticated);
            }
            response
                .json::<ValidatedClaims>()
                .await
                .map_err(|_| GatewayError::Unauthenticated)
        })
    }
}

/// Access control layer shared across requests.
pub struct AccessControl {
    enabled: bool,
    validator: Arc<dyn TokenValidator>,
}

impl AccessControl {
    pub fn from_config(config: &AuthConfig) -> Self {
        let validator: Arc<dyn TokenValidator> = match &config.introspection_url {
            Some(url) => Arc::new(RemoteTokenValidator::new(
                url.clone(),
                Duration::from_secs(config.introspection_timeout_secs),
            )),
            None => {
                let tokens = config
                    .static_tokens
                    .iter()
                    .map(|t| {
                        (
                            t.token.clone(),
                            ValidatedClaims {
                                subject: t.subject.clone(),
                                roles: t.roles.clone(),
                            },
                        )
                    })
                    .collect();
                Arc::new(StaticTokenValidator::new(tokens))
            }
        };
        Self {
            enabled: config.enabled,
            validator,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Validate a bearer token and derive the caller identity.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<CallerIdentity, GatewayError> {
        if !self.enabled {
            return Ok(CallerIdentity::anonymous());
        }
        let token = token.ok_or(GatewayError::Unauthenticated)?;
        let claims = self.validator.validate(token).await?;
        Ok(CallerIdentity::from_claims(claims))
    }

    /// Evaluate a named policy against an identity.
    pub fn authorize(&self, identity: &CallerIdentity, policy: Policy) -> Result<(), GatewayError> {
        let allowed = match policy {
            Policy::AdminOnly => identity.tier == Tier::Admin,
            Policy::PremiumAccess => identity.tier >= Tier::Premium,
        };
        if allowed {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized)
        }
    }

    /// Check a route's minimum tier. Disabled auth only satisfies
    /// standard-tier routes.
    pub fn authorize_tier(
        &self,
        identity: &CallerIdentity,
        required: Tier,
    ) -> Result<(), GatewayError> {
        if identity.tier >= required {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(roles: &[&str]) -> CallerIdentity {
        CallerIdentity::from_claims(ValidatedClaims {
            subject: "user-1".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        })
    }

    #[test]
    fn test_tier_from_roles() {
        assert_eq!(identity(&[]).tier, Tier::Standard);
        assert_eq!(identity(&["viewer"]).tier, Tier::Standard);
        assert_eq!(identity(&["premium"]).tier, Tier::Premium);
        assert_eq!(identity(&["premium", "admin"]).tier, Tier::Admin);
        assert_eq!(identity(&["Admin"]).tier, Tier::Admin);
    }

    #[test]
    fn test_policy_evaluation() {
        let ac = AccessControl::from_config(&AuthConfig {
            enabled: true,
            ..Default::default()
        });

        assert!(ac.authorize(&identity(&["admin"]), Policy::AdminOnly).is_ok());
        assert!(ac.authorize(&identity(&["premium"]), Policy::AdminOnly).is_err());
        assert!(ac.authorize(&identity(&["premium"]), Policy::PremiumAccess).is_ok());
        assert!(ac.authorize(&identity(&["admin"]), Policy::PremiumAccess).is_ok());
        assert!(ac.authorize(&identity(&[]), Policy::PremiumAccess).is_err());
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Admin > Tier::Premium);
        assert!(Tier::Premium > Tier::Standard);
    }

    #[tokio::test]
    async fn test_static_validator() {
        let mut tokens = HashMap::new();
        tokens.insert(
            "tok-1".to_string(),
            ValidatedClaims {
                subject: "alice".to_string(),
                roles: vec!["premium".to_string()],
            },
        );
        let ac = AccessControl {
            enabled: true,
            validator: Arc::new(StaticTokenValidator::new(tokens)),
        };

        let id = ac.authenticate(Some("tok-1")).await.unwrap();
        assert_eq!(id.subject, "alice");
        assert_eq!(id.tier, Tier::Premium);

        assert!(matches!(
            ac.authenticate(Some("bogus")).await,
            Err(GatewayError::Unauthenticated)
        ));
        assert!(matches!(
            ac.authenticate(None).await,
            Err(GatewayError::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn test_disabled_auth_is_anonymous_standard() {
        let ac = AccessControl::from_config(&AuthConfig::default());
        let id = ac.authenticate(None).await.unwrap();
        assert_eq!(id.tier, Tier::Standard);
        assert!(ac.authorize_tier(&id, Tier::Premium).is_err());
    }
}
