//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → request-id / trace / body-limit layers
//!     → access control middleware (attach CallerIdentity)
//!     → health endpoints | aggregated views | passthrough proxy
//! ```

pub mod server;

pub use server::{AppState, HttpServer};
