//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound call:
//!     → circuit_breaker.rs (fail fast if target circuit is open)
//!     → pipeline.rs (per-attempt timeout, classify failure)
//!     → On transient failure: backoff.rs delay, retry
//!     → circuit_breaker.rs (record one logical success/failure)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only transient failures (timeout, 5xx, transport) are retried
//! - One completed pipeline call records one breaker event, not one per attempt
//! - The pipeline returns a tagged outcome, never panics past its boundary

pub mod backoff;
pub mod circuit_breaker;
pub mod pipeline;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use pipeline::{AttemptError, CallFailure, CallOutcome, PolicyPipeline};
