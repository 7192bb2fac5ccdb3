//! Observability subsystem.
//!
//! # Design Decisions
//! - Structured logging via `tracing`, level from config or env
//! - Prometheus metrics on a separate listener
//! - Metric updates are cheap (atomic) and never fail the request path

pub mod logging;
pub mod metrics;
