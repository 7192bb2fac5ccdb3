//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request
//!     → access_control.rs (validate token, attach CallerIdentity + tier)
//!     → rate_limit.rs (per-route fixed-window admission)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Token validation is delegated to an external collaborator behind a trait
//! - Tier is derived once per request and read-only afterwards
//! - Admission state is per route, shared by all concurrent requests

pub mod access_control;
pub mod rate_limit;

pub use access_control::{AccessControl, CallerIdentity, Policy, Tier};
pub use rate_limit::{Admission, FixedWindowLimiter};
