//! Route lookup and upstream path rewriting.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Resolve (path, host) to a route, or explicit no-match
//! - Rewrite the matched prefix for the upstream URI
//!
//! # Design Decisions
//! - Host matching is exact; host names compare case-insensitively
//! - Path matching is case-sensitive prefix matching
//! - Resolution is a pure function of (path, host, table)

use crate::config::schema::{LimitClass, RouteConfig};
use crate::security::access_control::Tier;
use crate::upstream::BackendId;

/// A compiled route, immutable after startup.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    host: Option<String>,
    pub path_prefix: String,
    pub backend: BackendId,
    rewrite_prefix: Option<String>,
    pub tier: Tier,
    pub limit_class: LimitClass,
    priority: u32,
}

impl Route {
    fn from_config(config: RouteConfig) -> Self {
        Self {
            name: config.name,
            host: config.host.map(|h| h.to_lowercase()),
            path_prefix: config.path_prefix,
            backend: config.backend,
            rewrite_prefix: config.rewrite_prefix,
            tier: config.tier,
            limit_class: config.limit_class,
            priority: config.priority,
        }
    }

    fn matches(&self, path: &str, host: Option<&str>) -> bool {
        if let Some(expected) = &self.host {
            match host {
                Some(h) if h.to_lowercase() == *expected => {}
                _ => return false,
            }
        }
        path.starts_with(&self.path_prefix)
    }

    /// Path (and query) to use on the upstream, with the matched prefix
    /// rewritten per route configuration.
    pub fn upstream_path(&self, path_and_query: &str) -> String {
        match &self.rewrite_prefix {
            None => path_and_query.to_string(),
            Some(replacement) => {
                let rest = path_and_query
                    .strip_prefix(self.path_prefix.as_str())
                    .unwrap_or(path_and_query);
                let rewritten = format!("{}{}", replacement.trim_end_matches('/'), rest);
                if rewritten.is_empty() {
                    "/".to_string()
                } else {
                    rewritten
                }
            }
        }
    }
}

/// Immutable route table, looked up per request.
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Compile and sort routes. Higher priority first; longer prefixes
    /// break ties so `/videos/upload` beats `/videos`.
    pub fn from_config(configs: Vec<RouteConfig>) -> Self {
        let mut routes: Vec<Route> = configs.into_iter().map(Route::from_config).collect();
        routes.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.path_prefix.len().cmp(&a.path_prefix.len()))
        });
        Self { routes }
    }

    /// Resolve a request to a route. Pure: same inputs, same answer.
    pub fn resolve(&self, path: &str, host: Option<&str>) -> Option<&Route> {
        self.routes.iter().find(|route| route.matches(path, host))
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(name: &str, prefix: &str, backend: BackendId, priority: u32) -> RouteConfig {
        RouteConfig {
            name: name.to_string(),
            host: None,
            path_prefix: prefix.to_string(),
            backend,
            rewrite_prefix: None,
            tier: Tier::Standard,
            limit_class: LimitClass::Standard,
            priority,
        }
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let table = RouteTable::from_config(vec![
            route("videos", "/videos", BackendId::Content, 0),
            route("stats", "/stats", BackendId::Analytics, 0),
        ]);

        for _ in 0..3 {
            let r = table.resolve("/videos/42", None).expect("route must match");
            assert_eq!(r.name, "videos");
            assert_eq!(r.backend, BackendId::Content);
        }
        assert_eq!(table.resolve("/stats/daily", None).unwrap().name, "stats");
    }

    #[test]
    fn test_no_match_is_explicit() {
        let table = RouteTable::from_config(vec![route("videos", "/videos", BackendId::Content, 0)]);
        assert!(table.resolve("/images/1", None).is_none());
    }

    #[test]
    fn test_longer_prefix_wins() {
        let table = RouteTable::from_config(vec![
            route("videos", "/videos", BackendId::Content, 0),
            route("upload-status", "/videos/status", BackendId::Processing, 0),
        ]);
        assert_eq!(table.resolve("/videos/status/7", None).unwrap().name, "upload-status");
        assert_eq!(table.resolve("/videos/7", None).unwrap().name, "videos");
    }

    #[test]
    fn test_priority_beats_length() {
        let table = RouteTable::from_config(vec![
            route("catch-all", "/", BackendId::Content, 10),
            route("stats", "/stats", BackendId::Analytics, 0),
        ]);
        assert_eq!(table.resolve("/stats/daily", None).unwrap().name, "catch-all");
    }

    #[test]
    fn test_host_match_is_case_insensitive() {
        let mut config = route("videos", "/videos", BackendId::Content, 0);
        config.host = Some("Media.Example.Com".to_string());
        let table = RouteTable::from_config(vec![config]);

        assert!(table.resolve("/videos/1", Some("media.example.com")).is_some());
        assert!(table.resolve("/videos/1", Some("MEDIA.EXAMPLE.COM")).is_some());
        assert!(table.resolve("/videos/1", Some("other.example.com")).is_none());
        assert!(table.resolve("/videos/1", None).is_none());
    }

    #[test]
    fn test_prefix_rewrite() {
        let mut config = route("videos", "/videos", BackendId::Content, 0);
        config.rewrite_prefix = Some("/api/v1/videos".to_string());
        let table = RouteTable::from_config(vec![config]);

        let r = table.resolve("/videos/42?full=true", None).unwrap();
        assert_eq!(r.upstream_path("/videos/42?full=true"), "/api/v1/videos/42?full=true");
    }
}
