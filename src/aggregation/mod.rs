//! Aggregation subsystem.
//!
//! # Data Flow
//! ```text
//! Logical request (e.g. video detail)
//!     → service.rs fans out to content / processing / analytics
//!     → each call individually wrapped in the policy pipeline
//!     → join bounded by an overall deadline
//!     → merge: populated field per success, absent field per failure
//! ```
//!
//! # Design Decisions
//! - Partial success by default: one optional dependency failing narrows
//!   the view, it never fails the request
//! - The content record is the required dependency; without it the view
//!   is meaningless and the operation fails
//! - The merge is commutative; completion order does not affect output

pub mod service;

pub use service::{AggregationService, VideoDetailView};
