//! Stream client owning the single push-stream subscription.
//!
//! The client runs one background task per subscription. The task connects
//! through a [`Transport`], decodes `text/event-stream` frames, turns each
//! accepted event into a [`Sample`] and inserts it into the
//! [`RollingAggregator`]. Decode and transport failures never leave this
//! module: they are logged, counted and reflected in the published
//! [`ConnectionState`].

use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::aggregator::RollingAggregator;
use crate::error::TransportError;
use crate::sample::{Sample, SampleClock};
use crate::snapshot::ConnectionState;
use crate::stats::StreamStats;
use crate::stream::backoff::Backoff;
use crate::stream::sse::{SseDecoder, SseEvent, DEFAULT_EVENT_NAME};
use crate::stream::transport::{ByteStream, Transport};

/// Event name the upstream monitor uses for samples.
pub const SYSTEM_UPDATE_EVENT: &str = "system_update";

/// Callback invoked after a decoded sample has been inserted.
pub type SampleCallback = Box<dyn Fn(&Sample) + Send + Sync>;

/// Callback invoked on every applied connection-state transition.
pub type StateCallback = Box<dyn Fn(ConnectionState) + Send + Sync>;

/// Reconnection policy after a transport failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// First delay after a failure, in milliseconds (0 = retry immediately).
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the doubled delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Consecutive failed attempts before giving up (0 = never give up).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_max_attempts() -> u32 {
    20
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl ReconnectPolicy {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            self.initial_backoff_ms,
            self.max_backoff_ms,
            self.max_attempts,
        )
    }
}

/// Tunables for a [`StreamClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// SSE event names that carry samples; everything else is ignored.
    pub event_names: Vec<String>,
    pub reconnect: ReconnectPolicy,
    /// Treat the connection as dead after this long without any bytes.
    pub idle_timeout: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            event_names: vec![
                SYSTEM_UPDATE_EVENT.to_string(),
                DEFAULT_EVENT_NAME.to_string(),
            ],
            reconnect: ReconnectPolicy::default(),
            idle_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// Why the read loop of one connection ended.
enum PumpExit {
    Cancelled,
    Failed(TransportError),
}

struct Inner<T> {
    transport: T,
    aggregator: Arc<RollingAggregator>,
    stats: Arc<StreamStats>,
    clock: SampleClock,
    options: ClientOptions,
    sample_callbacks: Mutex<Vec<SampleCallback>>,
    state_callbacks: Mutex<Vec<StateCallback>>,
    /// Set once by `stop()`. Held for reading across every insert so that no
    /// insert can still be in flight once `stop()` has flipped it.
    closed: RwLock<bool>,
}

pub struct StreamClient<T: Transport> {
    inner: Arc<Inner<T>>,
    task: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl<T: Transport> std::fmt::Debug for StreamClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("state", &self.connection_state())
            .field("event_names", &self.inner.options.event_names)
            .finish()
    }
}

impl<T: Transport> StreamClient<T> {
    pub fn new(transport: T, aggregator: Arc<RollingAggregator>, options: ClientOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                aggregator,
                stats: Arc::new(StreamStats::new()),
                clock: SampleClock::new(),
                options,
                sample_callbacks: Mutex::new(Vec::new()),
                state_callbacks: Mutex::new(Vec::new()),
                closed: RwLock::new(false),
            }),
            task: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn aggregator(&self) -> &Arc<RollingAggregator> {
        &self.inner.aggregator
    }

    pub fn stats(&self) -> Arc<StreamStats> {
        Arc::clone(&self.inner.stats)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.aggregator.connection_state()
    }

    /// Whether a subscription task is currently alive.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Register a callback fired after each sample is inserted.
    ///
    /// Callbacks run on the ingestion path and must not register further
    /// callbacks.
    pub fn on_sample<F>(&self, f: F)
    where
        F: Fn(&Sample) + Send + Sync + 'static,
    {
        self.inner.sample_callbacks.lock().push(Box::new(f));
    }

    /// Register a callback fired on every applied connection-state change.
    pub fn on_connection_state_change<F>(&self, f: F)
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.inner.state_callbacks.lock().push(Box::new(f));
    }

    /// Opens the subscription to `endpoint` on a background task.
    ///
    /// Does nothing while a subscription is already running, or after
    /// [`StreamClient::stop`]. Transport failures are not returned: they show
    /// up as [`ConnectionState::Errored`]. Must be called from within a tokio
    /// runtime.
    pub fn start(&self, endpoint: &str) {
        // held until the task is stored so a concurrent stop() waits for it
        let closed = self.inner.closed.read();
        if *closed {
            warn!(endpoint, "stream client is closed, ignoring start");
            return;
        }

        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!(endpoint, "stream already running");
            return;
        }

        info!(endpoint, "starting stream subscription");
        let inner = Arc::clone(&self.inner);
        let cancel = self.cancel.clone();
        let url = endpoint.to_string();
        *task = Some(tokio::spawn(async move { inner.run(url, cancel).await }));
    }

    /// Handles one raw event payload: decode, insert, notify.
    ///
    /// Returns `true` if a sample was inserted. Malformed payloads are dropped
    /// without affecting history or the subscription.
    pub fn on_event(&self, raw_payload: &str) -> bool {
        self.inner.on_event(raw_payload)
    }

    /// Releases the subscription and moves to [`ConnectionState::Closed`].
    ///
    /// Cancels a pending read, waits for the task to finish and guarantees no
    /// insert happens afterwards. Idempotent.
    pub async fn stop(&self) {
        {
            let mut closed = self.inner.closed.write();
            if *closed {
                debug!("stream client already stopped");
            }
            *closed = true;
        }

        self.cancel.cancel();

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(error = %e, "stream task panicked");
                }
            }
        }

        self.inner.set_state(ConnectionState::Closed);
        info!("stream client stopped");
    }
}

impl<T: Transport> Drop for StreamClient<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<T: Transport> Inner<T> {
    fn set_state(&self, next: ConnectionState) {
        if self.aggregator.set_connection_state(next) {
            for cb in self.state_callbacks.lock().iter() {
                cb(next);
            }
        }
    }

    fn on_event(&self, raw_payload: &str) -> bool {
        let closed = self.closed.read();
        if *closed {
            trace!("dropping event received after stop");
            return false;
        }

        match Sample::decode(raw_payload, &self.clock) {
            Ok(sample) => {
                let callbacks = self.sample_callbacks.lock();
                let observed = (!callbacks.is_empty()).then(|| sample.clone());
                self.aggregator.insert(sample);
                self.stats.record_sample();
                if let Some(observed) = observed {
                    for cb in callbacks.iter() {
                        cb(&observed);
                    }
                }
                true
            }
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                self.stats.record_decode_error();
                false
            }
        }
    }

    fn handle_event(&self, event: SseEvent) {
        self.stats.record_frame();
        if !self.options.event_names.iter().any(|n| *n == event.event) {
            trace!(event = %event.event, "ignoring event");
            self.stats.record_ignored_event();
            return;
        }
        self.on_event(&event.data);
    }

    #[instrument(skip_all, fields(url = %url))]
    async fn run(self: Arc<Self>, url: String, cancel: CancellationToken) {
        let mut decoder = SseDecoder::new();
        let mut backoff = self.options.reconnect.backoff();

        loop {
            self.set_state(ConnectionState::Connecting);

            let last_event_id = decoder.last_event_id().map(str::to_owned);
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.transport.connect(&url, last_event_id.as_deref()) => result,
            };

            let failure = match connected {
                Ok(stream) => {
                    backoff.mark_success();
                    self.stats.record_connect();
                    self.set_state(ConnectionState::Open);
                    info!("stream connected");

                    decoder.reset();
                    match self.pump(stream, &mut decoder, &mut backoff, &cancel).await {
                        PumpExit::Cancelled => break,
                        PumpExit::Failed(e) => e,
                    }
                }
                Err(e) => e,
            };

            warn!(error = %failure, "stream transport error");
            self.stats.record_transport_error();
            self.set_state(ConnectionState::Errored);

            let Some(delay) = backoff.next_delay() else {
                error!(
                    attempts = backoff.attempts(),
                    "reconnect attempts exhausted, giving up"
                );
                break;
            };

            debug!(?delay, attempt = backoff.attempts(), "scheduling reconnect");
            self.stats.record_reconnect_attempt();
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        debug!("stream task exited");
    }

    async fn pump(
        &self,
        mut stream: ByteStream,
        decoder: &mut SseDecoder,
        backoff: &mut Backoff,
        cancel: &CancellationToken,
    ) -> PumpExit {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return PumpExit::Cancelled,
                next = self.next_chunk(&mut stream) => next,
            };

            let chunk = match next {
                Ok(Some(chunk)) => chunk,
                Ok(None) => return PumpExit::Failed(TransportError::Eof),
                Err(e) => return PumpExit::Failed(e),
            };

            for event in decoder.feed(&chunk) {
                self.handle_event(event);
            }

            let discarded = decoder.take_discarded();
            if discarded > 0 {
                warn!(discarded, "dropping oversized frame");
                for _ in 0..discarded {
                    self.stats.record_decode_error();
                }
            }

            if let Some(retry) = decoder.take_retry() {
                debug!(?retry, "server requested reconnect delay");
                backoff.set_initial(retry);
            }
        }
    }

    async fn next_chunk(
        &self,
        stream: &mut ByteStream,
    ) -> Result<Option<bytes::Bytes>, TransportError> {
        match self.options.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, stream.next())
                .await
                .map_err(|_| TransportError::IdleTimeout(limit))?
                .transpose(),
            None => stream.next().await.transpose(),
        }
    }
}
