//! Media API Gateway Library
//!
//! A fault-tolerant API gateway fronting the content store, processing
//! worker, and analytics service of a media platform.

pub mod aggregation;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod security;
pub mod upstream;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
