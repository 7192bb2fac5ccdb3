//! Lifecycle management.
//!
//! # Design Decisions
//! - Shutdown is a broadcast: every long-running task subscribes
//! - In-flight requests drain via axum's graceful shutdown

pub mod shutdown;

pub use shutdown::Shutdown;
