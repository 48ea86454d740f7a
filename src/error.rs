//! Error types for stream decoding and transport.
//!
//! Neither error crosses into the aggregator or a renderer: the stream client
//! recovers from both locally and surfaces them only as a
//! [`ConnectionState`](crate::snapshot::ConnectionState) change.

use thiserror::Error;

/// A single inbound frame could not be turned into a sample.
///
/// Policy: the frame is dropped, prior state is preserved and the
/// subscription continues.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("mem_free ({free}) exceeds mem_total ({total})")]
    MemoryFreeExceedsTotal { total: u64, free: u64 },

    #[error("total_cpu_usage is not a finite number")]
    NonFiniteCpu,
}

/// The underlying connection failed.
///
/// Policy: transition to `Errored`, attempt reconnection, keep history.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("unexpected content type {content_type:?} from {url}, expected text/event-stream")]
    ContentType { url: String, content_type: String },

    #[error("stream read failed: {0}")]
    Read(String),

    #[error("stream ended by server")]
    Eof,

    #[error("no data received for {0:?}")]
    IdleTimeout(std::time::Duration),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() || e.is_request() {
            TransportError::Connect {
                url: e
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "<unknown>".to_string()),
                message: e.to_string(),
            }
        } else {
            TransportError::Read(e.to_string())
        }
    }
}
