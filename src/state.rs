//! Application state management for the server.
//!
//! This module defines the shared application state that is passed
//! to HTTP handlers.

use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;
use sysmon_stream::{HttpTransport, RollingAggregator, StreamClient, StreamStats};

use crate::config::Config;
use crate::metrics::StreamMetrics;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Global application state shared across requests and the stream task.
pub struct AppState {
    pub registry: Registry,
    pub metrics: StreamMetrics,
    pub aggregator: Arc<RollingAggregator>,
    pub client: StreamClient<HttpTransport>,
    pub stats: Arc<StreamStats>,
    pub config: Arc<Config>,
    /// Full URL the stream client subscribes to.
    pub stream_url: String,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
