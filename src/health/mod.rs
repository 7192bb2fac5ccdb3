//! Health subsystem.
//!
//! # Data Flow
//! ```text
//! GET /health
//!     → aggregator.rs probes every backend concurrently, each bounded
//!     → per-dependency result (status, duration, error-as-data)
//!     → overall = worst individual status
//! ```
//!
//! # Design Decisions
//! - Checks never block each other; a hung dependency costs its own
//!   timeout, nothing more
//! - A timed-out dependency is reported Unhealthy, never omitted
//! - The endpoint itself always answers; dependency failure is data

pub mod aggregator;

pub use aggregator::{DependencyHealth, HealthAggregator, HealthReport, HealthStatus};
