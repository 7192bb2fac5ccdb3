//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (host, path)
//!     → router.rs (resolve against immutable table)
//!     → Return: matched Route or explicit NotFound
//!
//! Route compilation (at startup):
//!     RouteConfig[]
//!     → sort by priority, then prefix length
//!     → freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime (no locks)
//! - No regex in the hot path; prefix matching only
//! - Deterministic: same input always resolves the same route
//! - First match wins (priority order, longest prefix breaks ties)

pub mod router;

pub use router::{Route, RouteTable};
