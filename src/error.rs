//! Gateway error taxonomy.
//!
//! Every failure the gateway can surface to a client maps to exactly one
//! variant here, and every variant maps to one outward status code. Internal
//! components return these through `Result` rather than panicking.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Failures surfaced to clients.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The circuit for the target backend is open; no call was attempted.
    #[error("circuit open for backend {backend}")]
    CircuitOpen { backend: &'static str },

    /// A single-attempt call exceeded its deadline.
    #[error("upstream call to {backend} timed out")]
    Timeout { backend: &'static str },

    /// All retry attempts failed transiently.
    #[error("retries exhausted calling {backend}: {reason}")]
    ExhaustedRetries { backend: &'static str, reason: String },

    /// The upstream answered with a non-retryable error status.
    #[error("upstream {backend} returned {status}")]
    NonTransientUpstream { backend: &'static str, status: StatusCode },

    /// Admission control rejected the request.
    #[error("rate limit exceeded for route {route}")]
    RateLimited { route: String },

    /// Missing or invalid credentials.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Valid credentials, insufficient tier or role.
    #[error("unauthorized")]
    Unauthorized,

    /// The required dependency of an aggregated view failed.
    #[error("required dependency {backend} failed: {reason}")]
    RequiredDependencyFailed { backend: &'static str, reason: String },

    /// No route matched the request.
    #[error("no route matched")]
    RouteNotFound,
}

impl GatewayError {
    /// Outward status code for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::ExhaustedRetries { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::NonTransientUpstream { status, .. } => *status,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::Unauthorized => StatusCode::FORBIDDEN,
            GatewayError::RequiredDependencyFailed { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::RouteNotFound => StatusCode::NOT_FOUND,
        }
    }

    /// Stable machine-readable tag for logs and response bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::Timeout { .. } => "timeout",
            GatewayError::ExhaustedRetries { .. } => "exhausted_retries",
            GatewayError::NonTransientUpstream { .. } => "non_transient_upstream",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::Unauthenticated => "unauthenticated",
            GatewayError::Unauthorized => "unauthorized",
            GatewayError::RequiredDependencyFailed { .. } => "required_dependency_failed",
            GatewayError::RouteNotFound => "route_not_found",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            GatewayError::CircuitOpen { backend: "content" }.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::RateLimited { route: "videos".into() }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(GatewayError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(GatewayError::RouteNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            GatewayError::NonTransientUpstream {
                backend: "content",
                status: StatusCode::UNPROCESSABLE_ENTITY
            }
            .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
