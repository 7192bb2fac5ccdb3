//! Dependency health polling and worst-of reduction.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::observability::metrics;
use crate::upstream::{BackendId, BackendSet, UpstreamClient};

/// Dependency status, ordered so `max` picks the worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// One dependency's check result.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyHealth {
    pub name: &'static str,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

/// Full health report returned by `GET /health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: Vec<DependencyHealth>,
    #[serde(rename = "totalDurationMs")]
    pub total_duration_ms: u64,
}

/// Worst individual status wins; an empty list is healthy.
pub fn overall_status(checks: &[DependencyHealth]) -> HealthStatus {
    checks
        .iter()
        .map(|c| c.status)
        .max()
        .unwrap_or(HealthStatus::Healthy)
}

/// Polls each backend's health endpoint and reduces to one status.
pub struct HealthAggregator {
    client: UpstreamClient,
    backends: Arc<BackendSet>,
    timeout: Duration,
    degraded_after: Duration,
}

impl HealthAggregator {
    pub fn new(
        client: UpstreamClient,
        backends: Arc<BackendSet>,
        timeout: Duration,
        degraded_after: Duration,
    ) -> Self {
        Self {
            client,
            backends,
            timeout,
            degraded_after,
        }
    }

    /// Check every dependency concurrently and assemble the report.
    pub async fn check(&self) -> HealthReport {
        let start = Instant::now();
        let checks = futures_util::future::join_all(
            BackendId::ALL.into_iter().map(|id| self.check_one(id)),
        )
        .await;

        for check in &checks {
            metrics::record_backend_health(check.name, check.status == HealthStatus::Healthy);
        }

        HealthReport {
            status: overall_status(&checks),
            checks,
            total_duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn check_one(&self, id: BackendId) -> DependencyHealth {
        let target = self.backends.get(id);
        let uri = target.uri_for(&target.health_path);
        let start = Instant::now();

        let (status, exception) = match tokio::time::timeout(self.timeout, self.client.get(&uri)).await
        {
            Ok(Ok(response)) if response.status().is_success() => {
                if start.elapsed() > self.degraded_after {
                    (HealthStatus::Degraded, Some("slow response".to_string()))
                } else {
                    (HealthStatus::Healthy, None)
                }
            }
            Ok(Ok(response)) => (
                HealthStatus::Unhealthy,
                Some(format!("status {}", response.status())),
            ),
            Ok(Err(e)) => (HealthStatus::Unhealthy, Some(e.to_string())),
            Err(_) => (
                HealthStatus::Unhealthy,
                Some(format!("timeout after {}s", self.timeout.as_secs())),
            ),
        };

        if status != HealthStatus::Healthy {
            tracing::warn!(backend = %id, ?status, error = ?exception, "Dependency check failed");
        }

        DependencyHealth {
            name: id.name(),
            status,
            exception,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}
