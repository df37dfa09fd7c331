//! Connection supervisor.
//!
//! [`StreamClient`] owns the one persistent SSE transport per authenticated
//! session: it pulls a fresh token for every connection attempt, opens the
//! long-lived GET, feeds inbound frames through the decoder into the bus, and
//! recovers transport loss with a fixed-delay retry inside a configurable
//! budget. The connection loop runs as a single cancellable task, so at most
//! one transport and at most one pending reconnect timer exist at a time.

use std::pin::pin;
use std::sync::Arc;

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use metrics::counter;
use parking_lot::Mutex;
use quizcast_core::envelope::is_reserved_frame;
use quizcast_core::{ConnectionState, StreamConfig};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use crate::bus::{EventBus, Subscription};
use crate::credentials::CredentialProvider;
use crate::decode::decode_frame;
use crate::error::{StreamError, StreamResult};
use crate::filter::EventFilter;

/// Handle on the spawned connection loop. Dropping the handle tears the loop
/// down, so replacing the stored task can never leave a detached worker.
struct ConnectionTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ConnectionTask {
    fn shutdown(&self) {
        self.cancel.cancel();
        self.handle.abort();
    }
}

impl Drop for ConnectionTask {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Connection-state channel shared by the client and its worker.
///
/// All writes go through the `write` mutex, which serializes the worker's
/// cancelled-check-then-send against `disconnect()`'s cancel-then-send. A
/// worker write therefore lands either before the cancellation or not at all,
/// and `Disconnected` is always the last word.
struct StateChannel {
    tx: watch::Sender<ConnectionState>,
    write: Mutex<()>,
}

/// Reconnecting event-stream client.
///
/// Explicitly constructed and explicitly owned; inject it into whatever needs
/// live events instead of reaching for ambient global state.
pub struct StreamClient {
    credentials: Arc<dyn CredentialProvider>,
    http: reqwest::Client,
    bus: EventBus,
    state: Arc<StateChannel>,
    task: Mutex<Option<ConnectionTask>>,
}

impl StreamClient {
    /// Create a client with a fresh HTTP client.
    #[must_use]
    pub fn new(credentials: Arc<dyn CredentialProvider>) -> Self {
        Self::with_http_client(credentials, reqwest::Client::new())
    }

    /// Create a client sharing an existing HTTP client.
    #[must_use]
    pub fn with_http_client(credentials: Arc<dyn CredentialProvider>, http: reqwest::Client) -> Self {
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            credentials,
            http,
            bus: EventBus::new(),
            state: Arc::new(StateChannel {
                tx: state_tx,
                write: Mutex::new(()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Open the persistent connection described by `config`.
    ///
    /// Errors only on an empty endpoint. Everything else, including no
    /// credential being available, is reported through the state observable
    /// so callers can retry. Any previous connection (or pending reconnect
    /// timer) is torn down first, and the attempt counter starts fresh.
    pub fn connect(&self, config: StreamConfig) -> StreamResult<()> {
        if config.endpoint.is_empty() {
            return Err(StreamError::EmptyEndpoint);
        }
        let cancel = CancellationToken::new();
        let worker = ConnectionWorker {
            credentials: Arc::clone(&self.credentials),
            http: self.http.clone(),
            bus: self.bus.clone(),
            state: Arc::clone(&self.state),
            config,
            cancel: cancel.clone(),
        };
        // Teardown, spawn and store happen under one lock acquisition so two
        // racing connect() calls cannot both tear down the same task and then
        // each spawn a worker, leaving one running with no handle stored.
        let mut slot = self.task.lock();
        drop(slot.take());
        let handle = tokio::spawn(worker.run());
        *slot = Some(ConnectionTask { cancel, handle });
        Ok(())
    }

    /// Tear down the connection from any state. Idempotent.
    ///
    /// Closes the transport if open, cancels any pending reconnect timer, and
    /// drives the state to `Disconnected`.
    pub fn disconnect(&self) {
        let task = self.task.lock().take();
        // Cancelling and writing Disconnected under the state write lock
        // keeps a worker mid `set_state` from landing a stale Connecting or
        // Error after this returns.
        let _write = self.state.write.lock();
        if let Some(task) = &task {
            task.shutdown();
        }
        let _ = self.state.tx.send_replace(ConnectionState::Disconnected);
        debug!("disconnected");
    }

    /// Continuous connection-state observable.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.tx.subscribe()
    }

    /// Current connection state.
    #[must_use]
    pub fn current_state(&self) -> ConnectionState {
        *self.state.tx.borrow()
    }

    /// Register a subscription on the bus. Never touches the transport, so it
    /// is valid in any connection state.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.bus.subscribe(filter)
    }

    /// Subscribe to one event type.
    #[must_use]
    pub fn subscribe_to_type(&self, event_type: impl Into<String>) -> Subscription {
        self.subscribe(EventFilter::for_type(event_type))
    }

    /// Subscribe to everything scoped to one room (e.g. `"quiz:42"`).
    #[must_use]
    pub fn subscribe_to_room(&self, room: impl Into<String>) -> Subscription {
        self.subscribe(EventFilter::for_room(room))
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.bus.subscriber_count()
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        drop(self.task.lock().take());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection loop
// ─────────────────────────────────────────────────────────────────────────────

/// How a frame-pumping session ended.
#[derive(Debug, PartialEq, Eq)]
enum PumpEnd {
    /// `disconnect()` or a superseding `connect()` cancelled the task.
    Cancelled,
    /// The transport errored or the server closed the stream.
    Lost,
}

/// State owned by the spawned connection task.
struct ConnectionWorker {
    credentials: Arc<dyn CredentialProvider>,
    http: reqwest::Client,
    bus: EventBus,
    state: Arc<StateChannel>,
    config: StreamConfig,
    cancel: CancellationToken,
}

impl ConnectionWorker {
    #[instrument(skip_all, fields(endpoint = %self.config.endpoint))]
    async fn run(self) {
        let mut attempts: u32 = 0;
        let mut ever_connected = false;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            self.set_state(ConnectionState::Connecting);

            match self.credentials.token() {
                None => {
                    warn!("no credential available");
                    counter!("quizcast_auth_unavailable_total").increment(1);
                    self.set_state(ConnectionState::Error);
                    if !ever_connected {
                        // Auth-unavailable at connect time settles in Error
                        // without a transport; the caller retries connect()
                        // once credentials exist. A token gap mid-session is
                        // treated as a failed attempt instead, since rotation
                        // can leave a short window with no usable token.
                        return;
                    }
                }
                Some(token) => match self.open_stream(&token).await {
                    Ok(frames) => {
                        ever_connected = true;
                        attempts = 0;
                        self.set_state(ConnectionState::Connected);
                        counter!("quizcast_connections_total").increment(1);
                        debug!("transport opened");
                        if self.pump_frames(frames).await == PumpEnd::Cancelled {
                            return;
                        }
                        warn!("transport lost");
                        self.set_state(ConnectionState::Error);
                    }
                    Err(e) => {
                        warn!(error = %e, "connection attempt failed");
                        self.set_state(ConnectionState::Error);
                    }
                },
            }

            attempts += 1;
            counter!("quizcast_reconnect_attempts_total").increment(1);
            if attempts > self.config.max_reconnect_attempts {
                warn!(attempts, "reconnection budget exhausted; giving up");
                self.set_state(ConnectionState::Disconnected);
                return;
            }
            debug!(
                attempt = attempts,
                max_attempts = self.config.max_reconnect_attempts,
                delay_ms = self.config.reconnect_delay.as_millis() as u64,
                "reconnect scheduled"
            );
            tokio::select! {
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(self.config.reconnect_delay) => {}
            }
        }
    }

    /// Open the long-lived GET and hand back the parsed frame stream.
    async fn open_stream(
        &self,
        token: &str,
    ) -> StreamResult<impl Stream<Item = Result<Event, EventStreamError<reqwest::Error>>>> {
        let mut query: Vec<(&str, String)> = vec![("token", token.to_string())];
        if !self.config.rooms.is_empty() {
            query.push(("rooms", self.config.rooms.join(",")));
        }
        if !self.config.allowed_types.is_empty() {
            query.push(("types", self.config.allowed_types.join(",")));
        }

        let response = self
            .http
            .get(&self.config.endpoint)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }
        Ok(response.bytes_stream().eventsource())
    }

    /// Read frames serially until the transport ends or the task is
    /// cancelled. Each frame is fully decoded and published before the next
    /// is read, giving one total delivery order consistent with wire arrival.
    async fn pump_frames(
        &self,
        frames: impl Stream<Item = Result<Event, EventStreamError<reqwest::Error>>>,
    ) -> PumpEnd {
        let mut frames = pin!(frames);
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return PumpEnd::Cancelled,
                next = frames.next() => match next {
                    Some(Ok(frame)) => self.handle_frame(&frame),
                    Some(Err(e)) => {
                        warn!(error = %e, "stream error");
                        return PumpEnd::Lost;
                    }
                    None => {
                        debug!("server closed the stream");
                        return PumpEnd::Lost;
                    }
                },
            }
        }
    }

    fn handle_frame(&self, frame: &Event) {
        counter!("quizcast_frames_total").increment(1);
        if is_reserved_frame(&frame.event) {
            // `connected` is informational, `heartbeat` keeps intermediaries
            // from timing the transport out. Neither reaches the bus.
            trace!(frame = %frame.event, "reserved frame discarded");
            return;
        }
        if let Some(envelope) = decode_frame(&frame.event, &frame.data) {
            // The discriminator in the body can also carry a reserved tag,
            // e.g. a `message` frame whose JSON type is `heartbeat`.
            if is_reserved_frame(&envelope.event_type) {
                trace!(tag = %envelope.event_type, "reserved tag discarded");
                return;
            }
            self.bus.publish(&envelope);
        }
    }

    /// State writes stop once the task is cancelled so a concurrent
    /// `disconnect()` keeps the final word. The cancelled check and the send
    /// form one critical section with `disconnect()`'s cancel-then-send.
    fn set_state(&self, state: ConnectionState) {
        let _write = self.state.write.lock();
        if self.cancel.is_cancelled() {
            return;
        }
        let _ = self.state.tx.send_replace(state);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
