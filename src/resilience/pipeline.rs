//! Policy pipeline composing circuit breaking, timeout, and retry around
//! one outbound call.
//!
//! # Responsibilities
//! - Fail fast when the target circuit is open (no network call)
//! - Bound every attempt with the backend's timeout
//! - Retry transient failures with exponential backoff
//! - Record exactly one breaker event per logical call
//!
//! # Design Decisions
//! - The operation closure is rebuilt per attempt; idempotency is the
//!   caller's responsibility
//! - A non-transient upstream answer counts as breaker success: the
//!   backend is responsive, retrying cannot fix the request
//! - The outcome is a tagged enum; callers decide per-field how to degrade

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use axum::http::StatusCode;

use crate::config::schema::{CircuitBreakerConfig, RetryConfig};
use crate::error::GatewayError;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::circuit_breaker::CircuitBreaker;
use crate::upstream::BackendId;

/// Why a single attempt failed.
#[derive(Debug, Clone)]
pub enum CallFailure {
    /// The attempt exceeded its deadline.
    Timeout,
    /// Connection-level failure (refused, reset, DNS).
    Transport(String),
    /// The upstream answered with an error status.
    Status(StatusCode),
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallFailure::Timeout => write!(f, "timeout"),
            CallFailure::Transport(msg) => write!(f, "transport error: {}", msg),
            CallFailure::Status(status) => write!(f, "upstream status {}", status),
        }
    }
}

/// Classified attempt error, produced by the operation closure.
#[derive(Debug, Clone)]
pub enum AttemptError {
    /// Safe to retry: timeout, 5xx, connection error.
    Transient(CallFailure),
    /// Retrying cannot help: 4xx and other permanent answers.
    Fatal(CallFailure),
}

/// Final outcome of one logical call through the pipeline.
#[derive(Debug)]
pub enum CallOutcome<T> {
    Success(T),
    /// The circuit was open; no attempt was made.
    CircuitOpen,
    /// The single allowed attempt timed out.
    Timeout,
    /// Every attempt failed transiently.
    ExhaustedRetries(CallFailure),
    /// The upstream gave a non-retryable answer.
    NonTransient(CallFailure),
}

impl<T> CallOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, CallOutcome::Success(_))
    }

    /// Convert into a gateway error, consuming the outcome.
    pub fn into_result(self, backend: BackendId) -> Result<T, GatewayError> {
        match self {
            CallOutcome::Success(value) => Ok(value),
            CallOutcome::CircuitOpen => Err(GatewayError::CircuitOpen { backend: backend.name() }),
            CallOutcome::Timeout => Err(GatewayError::Timeout { backend: backend.name() }),
            CallOutcome::ExhaustedRetries(failure) => Err(GatewayError::ExhaustedRetries {
                backend: backend.name(),
                reason: failure.to_string(),
            }),
            CallOutcome::NonTransient(CallFailure::Status(status)) => {
                Err(GatewayError::NonTransientUpstream { backend: backend.name(), status })
            }
            CallOutcome::NonTransient(failure) => Err(GatewayError::ExhaustedRetries {
                backend: backend.name(),
                reason: failure.to_string(),
            }),
        }
    }
}

/// Retry + circuit breaker + timeout, one instance shared by all requests.
pub struct PolicyPipeline {
    retry: RetryConfig,
    breakers: HashMap<BackendId, CircuitBreaker>,
}

impl PolicyPipeline {
    pub fn new(retry: RetryConfig, breaker_config: &CircuitBreakerConfig) -> Self {
        let breakers = BackendId::ALL
            .into_iter()
            .map(|id| (id, CircuitBreaker::new(id.name(), breaker_config)))
            .collect();
        Self { retry, breakers }
    }

    /// Breaker for a backend. Total over the closed enum.
    pub fn breaker(&self, backend: BackendId) -> &CircuitBreaker {
        self.breakers
            .get(&backend)
            .expect("breaker registered for every backend at construction")
    }

    /// Execute one logical outbound call with the configured retry budget.
    ///
    /// `op` is invoked once per attempt and must build a fresh request
    /// each time. Each attempt is bounded by `timeout`.
    pub async fn execute<T, F, Fut>(
        &self,
        backend: BackendId,
        timeout: Duration,
        op: F,
    ) -> CallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        self.execute_with(backend, timeout, self.retry.max_attempts, op).await
    }

    /// Execute without retries. For non-idempotent operations, where a
    /// second attempt could apply the side effect twice.
    pub async fn execute_once<T, F, Fut>(
        &self,
        backend: BackendId,
        timeout: Duration,
        op: F,
    ) -> CallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        self.execute_with(backend, timeout, 1, op).await
    }

    async fn execute_with<T, F, Fut>(
        &self,
        backend: BackendId,
        timeout: Duration,
        max_attempts: u32,
        mut op: F,
    ) -> CallOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let breaker = self.breaker(backend);
        let Some(permit) = breaker.try_acquire() else {
            tracing::warn!(backend = %backend, "Circuit open, failing fast");
            metrics::record_circuit_rejection(backend.name());
            return CallOutcome::CircuitOpen;
        };

        let max_attempts = max_attempts.max(1);
        let mut attempt = 0u32;
        let last_failure;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(AttemptError::Transient(CallFailure::Timeout)),
            };

            match result {
                Ok(value) => {
                    permit.success();
                    return CallOutcome::Success(value);
                }
                Err(AttemptError::Fatal(failure)) => {
                    // The backend answered; this is not a backend fault.
                    permit.success();
                    return CallOutcome::NonTransient(failure);
                }
                Err(AttemptError::Transient(failure)) => {
                    if attempt >= max_attempts {
                        last_failure = failure;
                        break;
                    }
                    let delay =
                        calculate_backoff(attempt, self.retry.backoff_base, self.retry.max_delay_ms);
                    tracing::debug!(
                        backend = %backend,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        failure = %failure,
                        "Transient failure, retrying"
                    );
                    metrics::record_upstream_retry(backend.name());
                    tokio::time::sleep(delay).await;
                }
            }
        }

        // One logical failure regardless of attempt count.
        permit.failure();
        if max_attempts == 1 && matches!(last_failure, CallFailure::Timeout) {
            CallOutcome::Timeout
        } else {
            CallOutcome::ExhaustedRetries(last_failure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn pipeline(max_attempts: u32, threshold: u32) -> PolicyPipeline {
        PolicyPipeline::new(
            RetryConfig {
                max_attempts,
                backoff_base: 1.0,
                max_delay_ms: 1,
            },
            &CircuitBreakerConfig {
                failure_threshold: threshold,
                break_secs: 30,
                window_secs: 60,
            },
        )
    }

    #[tokio::test]
    async fn test_retry_then_success_counts_attempts() {
        let pipeline = pipeline(3, 5);
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let outcome = pipeline
            .execute(BackendId::Content, Duration::from_secs(1), move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(AttemptError::Transient(CallFailure::Status(
                            StatusCode::SERVICE_UNAVAILABLE,
                        )))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert!(matches!(outcome, CallOutcome::Success("ok")));
        assert_eq!(attempts.load(Ordering::SeqCst), 3, "k failures need k+1 attempts");
    }

    #[tokio::test]
    async fn test_fatal_failure_is_not_retried() {
        let pipeline = pipeline(3, 5);
        let attempts = Arc::new(AtomicU32::new(0));

        let counter = attempts.clone();
        let outcome: CallOutcome<&str> = pipeline
            .execute(BackendId::Content, Duration::from_secs(1), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AttemptError::Fatal(CallFailure::Status(StatusCode::NOT_FOUND)))
                }
            })
            .await;

        match outcome {
            CallOutcome::NonTransient(CallFailure::Status(status)) => {
                assert_eq!(status, StatusCode::NOT_FOUND)
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_is_one_breaker_failure() {
        let pipeline = pipeline(3, 5);

        let outcome: CallOutcome<&str> = pipeline
            .execute(BackendId::Content, Duration::from_secs(1), || async {
                Err(AttemptError::Transient(CallFailure::Status(
                    StatusCode::SERVICE_UNAVAILABLE,
                )))
            })
            .await;

        assert!(matches!(outcome, CallOutcome::ExhaustedRetries(_)));
        assert_eq!(
            pipeline.breaker(BackendId::Content).failure_count(),
            1,
            "three attempts are one logical failure"
        );
    }

    #[tokio::test]
    async fn test_circuit_opens_and_fails_fast() {
        let pipeline = pipeline(1, 2);
        let attempts = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let counter = attempts.clone();
            let _: CallOutcome<&str> = pipeline
                .execute(BackendId::Processing, Duration::from_secs(1), move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(AttemptError::Transient(CallFailure::Transport("refused".into())))
                    }
                })
                .await;
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        let counter = attempts.clone();
        let outcome: CallOutcome<&str> = pipeline
            .execute(BackendId::Processing, Duration::from_secs(1), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok("should not run")
                }
            })
            .await;

        assert!(matches!(outcome, CallOutcome::CircuitOpen));
        assert_eq!(attempts.load(Ordering::SeqCst), 2, "no network call while open");
    }

    #[tokio::test]
    async fn test_cancelled_trial_call_does_not_wedge_the_breaker() {
        use crate::resilience::circuit_breaker::CircuitState;

        let pipeline = PolicyPipeline::new(
            RetryConfig {
                max_attempts: 1,
                backoff_base: 1.0,
                max_delay_ms: 1,
            },
            &CircuitBreakerConfig {
                failure_threshold: 1,
                break_secs: 0, // break elapses immediately
                window_secs: 60,
            },
        );

        let _: CallOutcome<&str> = pipeline
            .execute(BackendId::Content, Duration::from_secs(1), || async {
                Err(AttemptError::Transient(CallFailure::Transport("refused".into())))
            })
            .await;
        assert_eq!(pipeline.breaker(BackendId::Content).state(), CircuitState::Open);
        tokio::time::sleep(Duration::from_millis(5)).await;

        // The caller that wins the trial is dropped mid-call, the way an
        // aggregation deadline or client disconnect cancels a handler.
        let trial = pipeline.execute(BackendId::Content, Duration::from_secs(5), || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, AttemptError>("late")
        });
        assert!(tokio::time::timeout(Duration::from_millis(20), trial).await.is_err());

        // A recovered backend must be reachable again.
        let outcome = pipeline
            .execute(BackendId::Content, Duration::from_secs(1), || async {
                Ok::<_, AttemptError>("ok")
            })
            .await;
        assert!(
            matches!(outcome, CallOutcome::Success("ok")),
            "breaker must not stay half-open after a cancelled trial"
        );
    }

    #[tokio::test]
    async fn test_single_attempt_timeout_outcome() {
        let pipeline = pipeline(1, 5);

        let outcome: CallOutcome<&str> = pipeline
            .execute(BackendId::Analytics, Duration::from_millis(20), || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok("too late")
            })
            .await;

        assert!(matches!(outcome, CallOutcome::Timeout));
    }
}
