use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use crate::error::TransportError;

/// Raw body chunks of an open event stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Opens the server-push connection the stream client reads from.
pub trait Transport: Send + Sync + 'static {
    /// Connect to `url`, resuming after `last_event_id` when the server
    /// supports it.
    fn connect(
        &self,
        url: &str,
        last_event_id: Option<&str>,
    ) -> impl Future<Output = Result<ByteStream, TransportError>> + Send;
}

/// `text/event-stream` over HTTP.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::Connect {
                url: String::new(),
                message: format!("building HTTP client: {e}"),
            })?;
        Ok(Self { http })
    }
}

impl Transport for HttpTransport {
    async fn connect(
        &self,
        url: &str,
        last_event_id: Option<&str>,
    ) -> Result<ByteStream, TransportError> {
        debug!(url, ?last_event_id, "opening event stream");

        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(id) = last_event_id {
            request = request.header("Last-Event-ID", id);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.starts_with("text/event-stream") {
            return Err(TransportError::ContentType {
                url: url.to_string(),
                content_type,
            });
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Read(e.to_string())));
        Ok(Box::pin(body))
    }
}
