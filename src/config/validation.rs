//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Enforce cross-field invariants (aggregation deadline covers the
//!   longest per-backend timeout)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before the config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::config::schema::{GatewayConfig, WindowConfig};
use crate::upstream::BackendId;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("route '{0}' has an empty or duplicate name")]
    BadRouteName(String),

    #[error("route '{0}': path_prefix must start with '/'")]
    BadPathPrefix(String),

    #[error("backend '{0}': invalid base_url: {1}")]
    BadBaseUrl(&'static str, url::ParseError),

    #[error("backend '{0}': timeout_secs must be at least 1")]
    BadBackendTimeout(&'static str),

    #[error("retries.max_attempts must be at least 1")]
    BadMaxAttempts,

    #[error("retries.backoff_base must be at least 1.0")]
    BadBackoffBase,

    #[error("circuit_breaker.{0} must be at least 1")]
    BadCircuitValue(&'static str),

    #[error("rate_limit.{0}: permit_limit and window_secs must be at least 1")]
    BadWindow(&'static str),

    #[error(
        "aggregation.deadline_secs ({deadline}) must cover the longest backend timeout ({longest})"
    )]
    DeadlineTooShort { deadline: u64, longest: u64 },

    #[error("health_check.timeout_secs must be at least 1")]
    BadHealthTimeout,
}

fn check_window(name: &'static str, window: &WindowConfig, errors: &mut Vec<ValidationError>) {
    if window.permit_limit == 0 || window.window_secs == 0 {
        errors.push(ValidationError::BadWindow(name));
    }
}

/// Validate a parsed configuration, collecting every problem.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for route in &config.routes {
        if route.name.is_empty() || !seen.insert(route.name.as_str()) {
            errors.push(ValidationError::BadRouteName(route.name.clone()));
        }
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::BadPathPrefix(route.name.clone()));
        }
    }

    for id in BackendId::ALL {
        let backend = config.backends.get(id);
        if let Err(e) = Url::parse(&backend.base_url) {
            errors.push(ValidationError::BadBaseUrl(id.name(), e));
        }
        if backend.timeout_secs == 0 {
            errors.push(ValidationError::BadBackendTimeout(id.name()));
        }
    }

    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::BadMaxAttempts);
    }
    if config.retries.backoff_base < 1.0 {
        errors.push(ValidationError::BadBackoffBase);
    }

    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::BadCircuitValue("failure_threshold"));
    }
    if config.circuit_breaker.window_secs == 0 {
        errors.push(ValidationError::BadCircuitValue("window_secs"));
    }

    check_window("standard", &config.rate_limit.standard, &mut errors);
    check_window("strict", &config.rate_limit.strict, &mut errors);

    let longest = BackendId::ALL
        .iter()
        .map(|id| config.backends.get(*id).timeout_secs)
        .max()
        .unwrap_or(0);
    if config.aggregation.deadline_secs < longest {
        errors.push(ValidationError::DeadlineTooShort {
            deadline: config.aggregation.deadline_secs,
            longest,
        });
    }

    if config.health_check.timeout_secs == 0 {
        errors.push(ValidationError::BadHealthTimeout);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
