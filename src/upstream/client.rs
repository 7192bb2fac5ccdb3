//! Shared upstream HTTP client and backend targets.
//!
//! # Responsibilities
//! - Hold one pooled hyper client used for every outbound call
//! - Resolve a `BackendId` to its base URL and per-attempt timeout
//! - Collect upstream response bodies into memory for retry/merge logic
//!
//! # Design Decisions
//! - The client is cheap to clone (it pools internally); no per-backend clients
//! - Targets are parsed once at startup and never mutated
//! - Body collection is bounded to protect gateway memory

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, Response};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client, Error as ClientError};
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::config::schema::BackendsConfig;
use crate::upstream::BackendId;

/// Upper bound on a buffered upstream response body.
const MAX_UPSTREAM_BODY: usize = 8 * 1024 * 1024;

/// A resolved backend endpoint.
#[derive(Debug, Clone)]
pub struct BackendTarget {
    pub id: BackendId,
    pub base_url: Url,
    pub timeout: Duration,
    pub health_path: String,
}

impl BackendTarget {
    /// Build an absolute URI string for a path (and optional query) on
    /// this backend. `path` must start with '/'.
    pub fn uri_for(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{}{}", base, path)
    }
}

/// The full set of resolved backend targets.
#[derive(Debug, Clone)]
pub struct BackendSet {
    content: BackendTarget,
    processing: BackendTarget,
    analytics: BackendTarget,
}

impl BackendSet {
    /// Resolve targets from configuration. Fails on an unparseable base URL.
    pub fn from_config(config: &BackendsConfig) -> Result<Self, url::ParseError> {
        let resolve = |id: BackendId| -> Result<BackendTarget, url::ParseError> {
            let cfg = config.get(id);
            Ok(BackendTarget {
                id,
                base_url: Url::parse(&cfg.base_url)?,
                timeout: Duration::from_secs(cfg.timeout_secs),
                health_path: cfg.health_path.clone(),
            })
        };
        Ok(Self {
            content: resolve(BackendId::Content)?,
            processing: resolve(BackendId::Processing)?,
            analytics: resolve(BackendId::Analytics)?,
        })
    }

    /// Look up a target. Total over the closed backend enum.
    pub fn get(&self, id: BackendId) -> &BackendTarget {
        match id {
            BackendId::Content => &self.content,
            BackendId::Processing => &self.processing,
            BackendId::Analytics => &self.analytics,
        }
    }
}

/// Pooled HTTP client shared by router, aggregation, and health checks.
#[derive(Clone)]
pub struct UpstreamClient {
    inner: Client<HttpConnector, Body>,
}

impl UpstreamClient {
    pub fn new() -> Self {
        let inner = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { inner }
    }

    /// Issue a raw request. The caller owns timeout and retry policy.
    pub async fn request(&self, req: Request<Body>) -> Result<Response<Incoming>, ClientError> {
        self.inner.request(req).await
    }

    /// Issue a GET with an empty body and a gateway user agent.
    pub async fn get(&self, uri: &str) -> Result<Response<Incoming>, ClientError> {
        let req = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::USER_AGENT, "media-gateway")
            .body(Body::empty())
            .expect("static request parts are valid");
        self.inner.request(req).await
    }
}

impl Default for UpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Buffer an upstream response body into memory, preserving status and
/// headers. Bodies over the bound are truncated errors, not panics.
pub async fn collect_response(
    resp: Response<Incoming>,
) -> Result<Response<axum::body::Bytes>, axum::Error> {
    let (parts, body) = resp.into_parts();
    let bytes = axum::body::to_bytes(Body::new(body), MAX_UPSTREAM_BODY).await?;
    Ok(Response::from_parts(parts, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BackendsConfig;

    #[test]
    fn test_uri_join() {
        let mut config = BackendsConfig::default();
        config.content.base_url = "http://content:5001/".to_string();
        let set = BackendSet::from_config(&config).unwrap();
        assert_eq!(
            set.get(BackendId::Content).uri_for("/videos/42"),
            "http://content:5001/videos/42"
        );
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let mut config = BackendsConfig::default();
        config.analytics.base_url = "not a url".to_string();
        assert!(BackendSet::from_config(&config).is_err());
    }
}
