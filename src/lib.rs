//! sysmon-stream library
//!
//! Real-time telemetry ingestion for a system monitor dashboard. A
//! [`StreamClient`] subscribes to the upstream `text/event-stream` feed of
//! CPU/memory samples and feeds a [`RollingAggregator`], which keeps a bounded
//! history window and recomputes max/mean/count after every insert. Renderers
//! read the published [`EngineSnapshot`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sysmon_stream::{
//!     ClientOptions, HttpTransport, MissingMemoryPolicy, RollingAggregator, StreamClient,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let aggregator = Arc::new(RollingAggregator::new(10, MissingMemoryPolicy::TreatAsZero));
//! let transport = HttpTransport::new(std::time::Duration::from_secs(5))?;
//! let client = StreamClient::new(transport, aggregator.clone(), ClientOptions::default());
//!
//! client.on_connection_state_change(|state| println!("stream is {state}"));
//! client.start("http://localhost:8080/sse/system/monitor");
//!
//! let snapshot = aggregator.snapshot();
//! println!("{} samples, max cpu {:?}", snapshot.history.len(), snapshot.aggregates.max_cpu);
//!
//! client.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod error;
pub mod ringbuffer;
pub mod sample;
pub mod snapshot;
pub mod stats;
pub mod stream;

// Re-export main types for convenience
pub use aggregator::{RollingAggregator, DEFAULT_HISTORY_CAPACITY};
pub use error::{DecodeError, TransportError};
pub use sample::{MemInfo, MonitorMessage, Sample, SampleClock};
pub use snapshot::{Aggregates, ConnectionState, EngineSnapshot, HistoryPoint, MissingMemoryPolicy};
pub use stats::StreamStats;
pub use stream::{ClientOptions, HttpTransport, ReconnectPolicy, StreamClient, Transport};
