//! Server-push stream ingestion.
//!
//! - `sse`: incremental `text/event-stream` frame decoder
//! - `transport`: connection abstraction and the HTTP implementation
//! - `backoff`: reconnect delay schedule
//! - `client`: the subscription task feeding the rolling aggregator

pub mod backoff;
pub mod client;
pub mod sse;
pub mod transport;

pub use backoff::Backoff;
pub use client::{ClientOptions, ReconnectPolicy, StreamClient, SYSTEM_UPDATE_EVENT};
pub use sse::{SseDecoder, SseEvent};
pub use transport::{ByteStream, HttpTransport, Transport};
