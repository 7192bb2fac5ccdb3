//! Multi-backend fan-out and partial-success merge.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::error::GatewayError;
use crate::observability::metrics;
use crate::resilience::pipeline::{AttemptError, CallFailure, CallOutcome, PolicyPipeline};
use crate::upstream::{client::collect_response, BackendId, BackendSet, UpstreamClient};

/// Composite view for one video, assembled from three backends.
///
/// An absent optional field means that dependency failed or was skipped,
/// not that the field is meaningless.
#[derive(Debug, Clone, Serialize)]
pub struct VideoDetailView {
    /// The content record. Required: the view does not exist without it.
    pub video: Value,

    /// Transcoding/processing status, if the processing worker answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing: Option<Value>,

    /// Recommendation list, if the analytics service answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Value>,
}

/// Orchestrates concurrent backend calls for aggregated operations.
pub struct AggregationService {
    pipeline: Arc<PolicyPipeline>,
    client: UpstreamClient,
    backends: Arc<BackendSet>,
    deadline: Duration,
}

impl AggregationService {
    pub fn new(
        pipeline: Arc<PolicyPipeline>,
        client: UpstreamClient,
        backends: Arc<BackendSet>,
        deadline: Duration,
    ) -> Self {
        Self {
            pipeline,
            client,
            backends,
            deadline,
        }
    }

    /// Build the video detail view.
    ///
    /// All three calls run concurrently; the overall deadline cancels
    /// whatever is still pending, and the merge uses what succeeded.
    pub async fn video_detail(&self, id: &str) -> Result<VideoDetailView, GatewayError> {
        let deadline = Instant::now() + self.deadline;

        let video_path = format!("/videos/{}", id);
        let status_path = format!("/status/{}", id);
        let recs_path = format!("/recommendations?videoId={}", id);

        let (video, processing, recommendations) = tokio::join!(
            self.fetch_json(BackendId::Content, &video_path, deadline),
            self.fetch_json(BackendId::Processing, &status_path, deadline),
            self.fetch_json(BackendId::Analytics, &recs_path, deadline),
        );

        let video = match video {
            CallOutcome::Success(value) => value,
            outcome @ CallOutcome::NonTransient(_) => {
                // The content store answered; surface its status as-is
                // (a missing video is a 404, not a gateway fault).
                return Err(outcome.into_result(BackendId::Content).unwrap_err());
            }
            outcome => {
                let reason = outcome
                    .into_result(BackendId::Content)
                    .err()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                metrics::record_aggregation(false);
                return Err(GatewayError::RequiredDependencyFailed {
                    backend: BackendId::Content.name(),
                    reason,
                });
            }
        };

        metrics::record_aggregation(true);
        Ok(VideoDetailView {
            video,
            processing: Self::optional(BackendId::Processing, processing),
            recommendations: Self::optional(BackendId::Analytics, recommendations),
        })
    }

    /// Absorb an optional dependency's failure: log it, leave the field
    /// absent.
    fn optional(backend: BackendId, outcome: CallOutcome<Value>) -> Option<Value> {
        match outcome {
            CallOutcome::Success(value) => Some(value),
            outcome => {
                let err = outcome.into_result(backend).err()?;
                tracing::warn!(
                    backend = %backend,
                    reason = %err,
                    "Optional dependency failed, field left absent"
                );
                None
            }
        }
    }

    /// One pipeline-wrapped JSON GET, additionally bounded by the
    /// aggregation deadline. Deadline expiry cancels the pending call.
    async fn fetch_json(
        &self,
        backend: BackendId,
        path: &str,
        deadline: Instant,
    ) -> CallOutcome<Value> {
        let target = self.backends.get(backend);
        let uri = target.uri_for(path);
        let client = self.client.clone();

        let call = self.pipeline.execute(backend, target.timeout, move || {
            let client = client.clone();
            let uri = uri.clone();
            async move {
                let response = client
                    .get(&uri)
                    .await
                    .map_err(|e| AttemptError::Transient(CallFailure::Transport(e.to_string())))?;

                let status = response.status();
                if status.is_server_error() {
                    return Err(AttemptError::Transient(CallFailure::Status(status)));
                }
                if !status.is_success() {
                    return Err(AttemptError::Fatal(CallFailure::Status(status)));
                }

                let response = collect_response(response).await.map_err(|e| {
                    AttemptError::Transient(CallFailure::Transport(e.to_string()))
                })?;
                serde_json::from_slice(response.body()).map_err(|_| {
                    AttemptError::Fatal(CallFailure::Transport("invalid json body".to_string()))
                })
            }
        });

        match tokio::time::timeout_at(deadline, call).await {
            Ok(outcome) => outcome,
            Err(_) => CallOutcome::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_fields_are_omitted_from_json() {
        let view = VideoDetailView {
            video: json!({"id": 42, "title": "launch"}),
            processing: None,
            recommendations: Some(json!([{"id": 7}])),
        };
        let body = serde_json::to_value(&view).unwrap();
        assert!(body.get("processing").is_none());
        assert_eq!(body["video"]["id"], 42);
        assert_eq!(body["recommendations"][0]["id"], 7);
    }
}
