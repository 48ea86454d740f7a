//! HTTP endpoint handlers for the server.
//!
//! This module provides handlers for all HTTP endpoints:
//! - `/`: Landing page listing the endpoints
//! - `/snapshot`: Published engine snapshot as JSON
//! - `/health`: Connection health and stream statistics
//! - `/metrics`: Prometheus metrics endpoint
//! - `/config`: Configuration display endpoint

pub mod config;
pub mod health;
pub mod metrics;
pub mod root;
pub mod snapshot;

// Re-export handlers
pub use config::config_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
pub use root::root_handler;
pub use snapshot::snapshot_handler;
