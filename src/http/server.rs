//! HTTP server setup and request handlers.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (trace, request ID, body limits, access control)
//! - Dispatch to the passthrough proxy or the aggregation service
//! - Serve health endpoints
//! - Map gateway errors to outward status codes
//!
//! # Design Decisions
//! - Health endpoints bypass authentication and admission control
//! - Route resolution happens before admission so limits are per route
//! - Request bodies are buffered (bounded) so attempts can be replayed

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::aggregation::AggregationService;
use crate::cache::ResponseCache;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::health::{HealthAggregator, HealthStatus};
use crate::observability::metrics;
use crate::resilience::pipeline::{AttemptError, CallFailure, CallOutcome, PolicyPipeline};
use crate::routing::{Route, RouteTable};
use crate::security::access_control::{AccessControl, CallerIdentity};
use crate::security::rate_limit::FixedWindowLimiter;
use crate::upstream::{client::collect_response, BackendSet, UpstreamClient};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: Arc<RouteTable>,
    pub backends: Arc<BackendSet>,
    pub client: UpstreamClient,
    pub pipeline: Arc<PolicyPipeline>,
    pub limiter: Arc<FixedWindowLimiter>,
    pub aggregator: Arc<AggregationService>,
    pub health: Arc<HealthAggregator>,
    pub access: Arc<AccessControl>,
    pub cache: Option<Arc<dyn ResponseCache>>,
    pub config: Arc<GatewayConfig>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Build the server and all its subsystems from configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, url::ParseError> {
        let routes = Arc::new(RouteTable::from_config(config.routes.clone()));
        let backends = Arc::new(BackendSet::from_config(&config.backends)?);
        let client = UpstreamClient::new();
        let pipeline = Arc::new(PolicyPipeline::new(
            config.retries.clone(),
            &config.circuit_breaker,
        ));
        let limiter = Arc::new(FixedWindowLimiter::new(config.rate_limit.clone()));
        let aggregator = Arc::new(AggregationService::new(
            pipeline.clone(),
            client.clone(),
            backends.clone(),
            Duration::from_secs(config.aggregation.deadline_secs),
        ));
        let health = Arc::new(HealthAggregator::new(
            client.clone(),
            backends.clone(),
            Duration::from_secs(config.health_check.timeout_secs),
            Duration::from_millis(config.health_check.degraded_after_ms),
        ));
        let access = Arc::new(AccessControl::from_config(&config.auth));
        let cache = crate::cache::from_config(&config.cache);

        let state = AppState {
            routes,
            backends,
            client,
            pipeline,
            limiter,
            aggregator,
            health,
            access,
            cache,
            config: Arc::new(config),
        };

        Ok(Self {
            router: Self::build_router(state),
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        // Health endpoints skip auth and admission; they must answer even
        // when everything else is saturated.
        let health_routes = Router::new()
            .route("/health", get(health_handler))
            .route("/health/ready", get(ready_handler))
            .route("/health/live", get(live_handler))
            .with_state(state.clone());

        let api_routes = Router::new()
            .route("/views/videos/{id}", get(video_detail_handler))
            .fallback(proxy_handler)
            .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
            .with_state(state.clone());

        Router::new()
            .merge(health_routes)
            .merge(api_routes)
            .layer(axum::extract::DefaultBodyLimit::max(state.config.listener.max_body_size))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                crate::lifecycle::Shutdown::signalled(shutdown).await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Validate credentials and attach the caller identity.
async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match state.access.authenticate(token).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => {
            tracing::debug!(error = %err, "Authentication failed");
            err.into_response()
        }
    }
}

fn caller(request_extensions: &axum::http::Extensions) -> CallerIdentity {
    request_extensions
        .get::<CallerIdentity>()
        .cloned()
        .unwrap_or_else(CallerIdentity::anonymous)
}

fn fail(err: GatewayError, method: &str, route: &str, start: Instant) -> Response {
    let status = err.status();
    if status.is_server_error() {
        tracing::warn!(route, kind = err.kind(), error = %err, "Request failed");
    }
    metrics::record_request(method, status.as_u16(), route, start);
    err.into_response()
}

/// Passthrough proxy: resolve, authorize, admit, forward through the
/// policy pipeline.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let method_str = method.to_string();
    let path = request.uri().path().to_string();
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| path.clone());
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let identity = caller(request.extensions());

    let route: Route = match state.routes.resolve(&path, host.as_deref()) {
        Some(route) => route.clone(),
        None => {
            tracing::debug!(request_id = %request_id, path = %path, "No route matched");
            return fail(GatewayError::RouteNotFound, &method_str, "none", start);
        }
    };

    if let Err(err) = state.access.authorize_tier(&identity, route.tier) {
        return fail(err, &method_str, &route.name, start);
    }
    if let Err(err) = state.limiter.admit(&route.name, route.limit_class, &identity).await {
        return fail(err, &method_str, &route.name, start);
    }

    // Buffer the body so retry attempts can replay it. The body-limit
    // layer has already bounded its size.
    let (parts, body) = request.into_parts();
    let body_bytes: Bytes =
        match axum::body::to_bytes(body, state.config.listener.max_body_size).await {
            Ok(bytes) => bytes,
            Err(_) => {
                metrics::record_request(&method_str, 400, &route.name, start);
                return (StatusCode::BAD_REQUEST, "Unreadable request body").into_response();
            }
        };

    let target = state.backends.get(route.backend);
    let uri = target.uri_for(&route.upstream_path(&path_and_query));

    tracing::debug!(
        request_id = %request_id,
        route = %route.name,
        backend = %route.backend,
        upstream = %uri,
        "Forwarding request"
    );

    let op = || {
        let client = state.client.clone();
        let method = method.clone();
        let uri = uri.clone();
        let headers = parts.headers.clone();
        let request_id = request_id.clone();
        let body = body_bytes.clone();
        async move {
            let mut builder = Request::builder().method(method).uri(uri.as_str());
            if let Some(out_headers) = builder.headers_mut() {
                for (name, value) in headers.iter() {
                    if name != header::HOST {
                        out_headers.insert(name.clone(), value.clone());
                    }
                }
                if let Ok(value) = HeaderValue::from_str(&request_id) {
                    out_headers.insert("x-request-id", value);
                }
            }
            let upstream_request = builder.body(Body::from(body)).map_err(|e| {
                AttemptError::Fatal(CallFailure::Transport(e.to_string()))
            })?;

            let response = client
                .request(upstream_request)
                .await
                .map_err(|e| AttemptError::Transient(CallFailure::Transport(e.to_string())))?;

            let status = response.status();
            if status.is_server_error() {
                return Err(AttemptError::Transient(CallFailure::Status(status)));
            }
            // 4xx and the rest pass through to the client untouched.
            collect_response(response)
                .await
                .map_err(|e| AttemptError::Transient(CallFailure::Transport(e.to_string())))
        }
    };

    let outcome = if method.is_idempotent() {
        state.pipeline.execute(route.backend, target.timeout, op).await
    } else {
        state.pipeline.execute_once(route.backend, target.timeout, op).await
    };

    match outcome {
        CallOutcome::Success(upstream) => {
            let (mut parts, bytes) = upstream.into_parts();
            // Body is buffered; hop-by-hop framing headers no longer apply.
            parts.headers.remove(header::TRANSFER_ENCODING);
            parts.headers.remove(header::CONNECTION);
            metrics::record_request(&method_str, parts.status.as_u16(), &route.name, start);
            Response::from_parts(parts, Body::from(bytes))
        }
        outcome => match outcome.into_result(route.backend) {
            Err(err) => fail(err, &method_str, &route.name, start),
            Ok(_) => unreachable!("success handled above"),
        },
    }
}

/// Aggregated video detail view.
async fn video_detail_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let identity = caller(request.extensions());
    let aggregation = &state.config.aggregation;
    const ROUTE: &str = "video_detail";

    if let Err(err) = state.access.authorize_tier(&identity, aggregation.tier) {
        return fail(err, "GET", ROUTE, start);
    }
    if let Err(err) = state
        .limiter
        .admit(ROUTE, aggregation.limit_class, &identity)
        .await
    {
        return fail(err, "GET", ROUTE, start);
    }

    let cache_key = format!("video_detail:{}", id);
    if let Some(cache) = &state.cache {
        if let Some(cached) = cache.get(&cache_key) {
            tracing::debug!(video = %id, "Serving aggregated view from cache");
            metrics::record_request("GET", 200, ROUTE, start);
            return Json(cached).into_response();
        }
    }

    match state.aggregator.video_detail(&id).await {
        Ok(view) => {
            // Cache only complete views so recovered dependencies
            // reappear as soon as they are back.
            if view.processing.is_some() && view.recommendations.is_some() {
                if let (Some(cache), Ok(value)) = (&state.cache, serde_json::to_value(&view)) {
                    cache.put(cache_key, value);
                }
            }
            metrics::record_request("GET", 200, ROUTE, start);
            Json(view).into_response()
        }
        Err(err) => fail(err, "GET", ROUTE, start),
    }
}

/// Full health report with per-dependency detail. Always 200: failure
/// is reported as data, not as a failing endpoint.
async fn health_handler(State(state): State<AppState>) -> Response {
    let report = state.health.check().await;
    Json(report).into_response()
}

/// Readiness: 503 while any dependency is hard-down.
async fn ready_handler(State(state): State<AppState>) -> Response {
    let report = state.health.check().await;
    if report.status == HealthStatus::Unhealthy {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    } else {
        (StatusCode::OK, "ready").into_response()
    }
}

/// Liveness: the process is up and serving.
async fn live_handler() -> Response {
    (StatusCode::OK, "alive").into_response()
}
