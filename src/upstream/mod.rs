//! Upstream backend abstraction.
//!
//! # Data Flow
//! ```text
//! BackendId (closed enum, resolved at startup)
//!     → BackendSet (base URL + timeout per backend)
//!     → client.rs (shared hyper client, request helpers)
//! ```
//!
//! # Design Decisions
//! - Backends are a closed enum, not string keys; dispatch is exhaustive
//! - Base URLs parsed and frozen at startup
//! - One shared connection-pooling client for all backends

pub mod client;

use serde::{Deserialize, Serialize};

pub use client::{BackendSet, BackendTarget, UpstreamClient};

/// The closed set of services this gateway fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendId {
    /// Video/content record store.
    Content,
    /// Transcoding/processing status worker.
    Processing,
    /// Analytics and recommendation service.
    Analytics,
}

impl BackendId {
    /// All backends, in registration order.
    pub const ALL: [BackendId; 3] = [BackendId::Content, BackendId::Processing, BackendId::Analytics];

    /// Stable name for logs, metrics, and health reports.
    pub fn name(self) -> &'static str {
        match self {
            BackendId::Content => "content",
            BackendId::Processing => "processing",
            BackendId::Analytics => "analytics",
        }
    }
}

impl std::fmt::Display for BackendId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
