//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::security::access_control::Tier;
use crate::upstream::BackendId;

/// Root configuration for the API gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Route definitions mapping requests to backends.
    pub routes: Vec<RouteConfig>,

    /// Backend service definitions (content, processing, analytics).
    pub backends: BackendsConfig,

    /// Dependency health check settings.
    pub health_check: HealthCheckConfig,

    /// Retry configuration for the policy pipeline.
    pub retries: RetryConfig,

    /// Circuit breaker configuration for the policy pipeline.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Per-class rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Aggregated-view settings (deadline, admission class).
    pub aggregation: AggregationConfig,

    /// Access control settings.
    pub auth: AuthConfig,

    /// Optional response cache.
    pub cache: CacheConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_size: 2 * 1024 * 1024,
        }
    }
}

/// Admission class assigned to a route.
///
/// "standard" routes get a higher permit budget over a longer window;
/// "strict" routes protect expensive endpoints with a tighter budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LimitClass {
    #[default]
    Standard,
    Strict,
}

/// Route configuration mapping a path prefix to a backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Host header to match (exact, case-insensitive). None = any host.
    #[serde(default)]
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: String,

    /// Backend to forward to.
    pub backend: BackendId,

    /// Replacement for the matched prefix on the upstream URI.
    /// None keeps the original path unchanged.
    #[serde(default)]
    pub rewrite_prefix: Option<String>,

    /// Minimum caller tier required for this route.
    #[serde(default)]
    pub tier: Tier,

    /// Admission class for rate limiting.
    #[serde(default)]
    pub limit_class: LimitClass,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

/// A single backend service endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL (e.g., "http://content:5001").
    pub base_url: String,

    /// Per-attempt timeout for calls to this backend, in seconds.
    pub timeout_secs: u64,

    /// Path probed by the health aggregator.
    pub health_path: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5001".to_string(),
            timeout_secs: 10,
            health_path: "/health".to_string(),
        }
    }
}

/// The closed set of backends the gateway fronts.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BackendsConfig {
    pub content: BackendConfig,
    pub processing: BackendConfig,
    pub analytics: BackendConfig,
}

impl BackendsConfig {
    /// Look up the config for a backend identifier.
    pub fn get(&self, id: BackendId) -> &BackendConfig {
        match id {
            BackendId::Content => &self.content,
            BackendId::Processing => &self.processing,
            BackendId::Analytics => &self.analytics,
        }
    }
}

/// Dependency health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Per-dependency check timeout in seconds.
    pub timeout_secs: u64,

    /// Latency above which a responsive dependency is reported Degraded,
    /// in milliseconds.
    pub degraded_after_ms: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            degraded_after_ms: 2_000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per logical call (first try included).
    pub max_attempts: u32,

    /// Base for exponential backoff; delay is `base^attempt` seconds.
    pub backoff_base: f64,

    /// Cap on a single backoff delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures within the tracking window before the circuit opens.
    pub failure_threshold: u32,

    /// How long the circuit stays open before allowing a trial call,
    /// in seconds.
    pub break_secs: u64,

    /// Tracking window for the rolling failure count, in seconds.
    pub window_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            break_secs: 30,
            window_secs: 60,
        }
    }
}

/// Fixed-window admission parameters for one class of routes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Requests admitted per window.
    pub permit_limit: u32,

    /// Window length in seconds; windows are wall-clock aligned.
    pub window_secs: u64,

    /// Maximum queued requests once the window is exhausted.
    pub queue_limit: usize,

    /// Maximum time a queued request waits before rejection, in
    /// milliseconds.
    pub max_wait_ms: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            permit_limit: 100,
            window_secs: 60,
            queue_limit: 10,
            max_wait_ms: 5_000,
        }
    }
}

/// Rate limiting configuration, one window shape per class.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable admission control.
    pub enabled: bool,

    pub standard: WindowConfig,
    pub strict: WindowConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            standard: WindowConfig::default(),
            strict: WindowConfig {
                permit_limit: 10,
                window_secs: 10,
                queue_limit: 4,
                max_wait_ms: 2_000,
            },
        }
    }
}

impl RateLimitConfig {
    /// Window parameters for an admission class.
    pub fn class(&self, class: LimitClass) -> &WindowConfig {
        match class {
            LimitClass::Standard => &self.standard,
            LimitClass::Strict => &self.strict,
        }
    }
}

/// Aggregated-view configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Overall deadline for one aggregated request, in seconds.
    /// Must be >= the longest per-backend timeout.
    pub deadline_secs: u64,

    /// Minimum caller tier for aggregated views.
    pub tier: Tier,

    /// Admission class for aggregated views.
    pub limit_class: LimitClass,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 15,
            tier: Tier::Standard,
            limit_class: LimitClass::Strict,
        }
    }
}

/// A token accepted by the static validator (development/testing).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StaticTokenConfig {
    pub token: String,
    pub subject: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Access control configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable authentication. When disabled, requests run as an
    /// anonymous standard-tier caller.
    pub enabled: bool,

    /// Remote token introspection endpoint. When set, bearer tokens are
    /// validated by POSTing to this URL; otherwise the static token
    /// table below is used.
    pub introspection_url: Option<String>,

    /// Introspection call timeout in seconds.
    pub introspection_timeout_secs: u64,

    /// Static token table for the local validator.
    pub static_tokens: Vec<StaticTokenConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            introspection_url: None,
            introspection_timeout_secs: 5,
            static_tokens: Vec::new(),
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching of aggregated views. Disabled degrades to no
    /// caching; it never fails the gateway.
    pub enabled: bool,

    /// Entry time-to-live in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
