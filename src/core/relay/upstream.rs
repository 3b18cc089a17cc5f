//! Upstream connection manager.
//!
//! Owns the connection to the realtime API for one relay session: the
//! connection state, the queue of messages waiting for a live connection, and
//! the task that reads upstream frames and publishes them to the session.
//!
//! # State machine
//!
//! ```text
//!                  connect()                 connect ok + flush
//! Disconnected{_} ----------> Connecting ----------------------> Connected
//!        ^                        |                                  |
//!        |     connect failed     |     disconnect(i) / drop / send  |
//!        +------------------------+----------------------------------+
//! ```
//!
//! `Disconnected { intentional: true }` is only entered through an explicit
//! [`UpstreamManager::disconnect`] and suppresses [`UpstreamManager::reconnect_if_needed`]
//! until the next explicit [`UpstreamManager::connect`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::base::{
    RelayError, RelayResult, UpstreamConnector, UpstreamLink, UpstreamSink, UpstreamStream,
};

/// Upper bound on waiting for the reader task to stop during disconnect.
const READER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Upstream connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection. `intentional` is true after an explicit disconnect request.
    Disconnected { intentional: bool },
    /// A connect attempt is in flight
    Connecting,
    /// Connected and queue flushed
    Connected,
}

impl ConnectionState {
    pub fn is_intentional_disconnect(&self) -> bool {
        matches!(self, ConnectionState::Disconnected { intentional: true })
    }
}

/// Events published by the upstream reader task.
#[derive(Debug, Clone)]
pub enum UpstreamEvent {
    /// A text frame from upstream. `envelope` is `None` when the frame is not JSON.
    Message {
        raw: String,
        envelope: Option<Value>,
    },
    /// The connection ended without a disconnect request.
    Dropped { reason: Option<String> },
}

/// What [`UpstreamManager::send`] did with a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Queued,
}

struct ManagerInner {
    state: ConnectionState,
    queue: VecDeque<String>,
    sink: Option<UpstreamSink>,
    reader: Option<JoinHandle<()>>,
    /// Bumped whenever the current connection is abandoned, so a stale reader
    /// or a superseded connect attempt cannot touch newer state.
    generation: u64,
}

/// Manages the upstream connection for one relay session.
///
/// All mutation of the connection state and pending queue happens inside this
/// type; callers only use its public operations.
pub struct UpstreamManager {
    connector: Arc<dyn UpstreamConnector>,
    inner: Arc<Mutex<ManagerInner>>,
    /// Connected flag for lock-free checks (shared with the reader task)
    connected: Arc<AtomicBool>,
    events: mpsc::Sender<UpstreamEvent>,
}

impl UpstreamManager {
    /// Create a manager in `Disconnected { intentional: false }`.
    ///
    /// Upstream frames and drop notices are published on `events`.
    pub fn new(connector: Arc<dyn UpstreamConnector>, events: mpsc::Sender<UpstreamEvent>) -> Self {
        Self {
            connector,
            inner: Arc::new(Mutex::new(ManagerInner {
                state: ConnectionState::Disconnected { intentional: false },
                queue: VecDeque::new(),
                sink: None,
                reader: None,
                generation: 0,
            })),
            connected: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    /// Open the upstream connection.
    ///
    /// No-op while another attempt is in flight or when already connected. On
    /// success the pending queue is flushed in order before any later `send`
    /// can reach the wire. Failures are returned as-is; there is no internal retry.
    pub async fn connect(&self) -> RelayResult<()> {
        let generation = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                ConnectionState::Connecting => {
                    debug!("Upstream connect already in progress");
                    return Ok(());
                }
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected { .. } => {}
            }
            inner.state = ConnectionState::Connecting;
            inner.generation
        };

        info!(endpoint = %self.connector.endpoint(), "Connecting to upstream realtime API");
        let result = self.connector.connect().await;

        let mut inner = self.inner.lock().await;

        if inner.generation != generation {
            // disconnect() ran while we were connecting; it wins.
            info!("Upstream connect completed after disconnect request, closing new connection");
            if let Ok(mut link) = result {
                let _ = link.sink.close().await;
            }
            return Ok(());
        }

        let UpstreamLink { sink, stream } = match result {
            Ok(link) => link,
            Err(e) => {
                error!("Failed to connect to upstream: {}", e);
                inner.state = ConnectionState::Disconnected { intentional: false };
                return Err(e);
            }
        };

        info!("Connected to upstream realtime API");
        inner.sink = Some(sink);
        inner.reader = Some(self.spawn_reader(stream, generation));
        inner.state = ConnectionState::Connected;
        self.connected.store(true, Ordering::SeqCst);

        // Flush while holding the lock so sends issued after this connect
        // cannot overtake queued messages.
        let pending = inner.queue.len();
        if pending > 0 {
            info!("Processing {} queued messages", pending);
        }
        while let Some(message) = inner.queue.pop_front() {
            let Some(sink) = inner.sink.as_mut() else {
                inner.queue.push_front(message);
                break;
            };
            let result = sink.send(message.clone()).await;
            if let Err(e) = result {
                warn!("Failed to flush queued message: {}", e);
                inner.queue.push_front(message);
                self.abandon_connection(&mut inner, false);
                return Err(e);
            }
        }

        Ok(())
    }

    /// Close the upstream connection.
    ///
    /// With `intentional = true` automatic reconnection is suppressed until the
    /// next explicit [`connect`](Self::connect). Queued messages are kept.
    pub async fn disconnect(&self, intentional: bool) {
        let (sink, reader) = {
            let mut inner = self.inner.lock().await;
            let sink = inner.sink.take();
            let reader = inner.reader.take();
            inner.generation += 1;
            inner.state = ConnectionState::Disconnected { intentional };
            self.connected.store(false, Ordering::SeqCst);
            (sink, reader)
        };

        if let Some(reader) = reader {
            reader.abort();
            if tokio::time::timeout(READER_SHUTDOWN_TIMEOUT, reader)
                .await
                .is_err()
            {
                warn!("Upstream reader did not stop within {:?}", READER_SHUTDOWN_TIMEOUT);
            }
        }

        if let Some(mut sink) = sink {
            match sink.close().await {
                Ok(()) => info!(intentional, "Disconnected from upstream realtime API"),
                Err(e) => debug!("Error closing upstream connection: {}", e),
            }
        }
    }

    /// Send a payload upstream, queueing it if there is no live connection.
    ///
    /// Returns [`RelayError::UpstreamUnavailable`] without queueing when an
    /// intentional disconnect is in effect. On a transport failure the payload
    /// is put back at the head of the queue, the connection is marked
    /// disconnected, and the error is returned so the caller can reconnect.
    pub async fn send(&self, payload: String) -> RelayResult<SendOutcome> {
        let mut inner = self.inner.lock().await;

        match inner.state {
            ConnectionState::Connected => {
                let Some(sink) = inner.sink.as_mut() else {
                    inner.queue.push_back(payload);
                    return Ok(SendOutcome::Queued);
                };
                let result = sink.send(payload.clone()).await;
                match result {
                    Ok(()) => Ok(SendOutcome::Sent),
                    Err(e) => {
                        warn!("Failed to send upstream message: {}", e);
                        inner.queue.push_front(payload);
                        self.abandon_connection(&mut inner, false);
                        Err(e)
                    }
                }
            }
            ConnectionState::Disconnected { intentional: true } => {
                Err(RelayError::UpstreamUnavailable(
                    "upstream was disconnected at the client's request".to_string(),
                ))
            }
            ConnectionState::Connecting | ConnectionState::Disconnected { intentional: false } => {
                info!("Queueing message while establishing upstream connection");
                inner.queue.push_back(payload);
                Ok(SendOutcome::Queued)
            }
        }
    }

    /// Reconnect unless the disconnect was intentional.
    ///
    /// Returns whether a connect attempt was made. Connect failures are returned
    /// to the caller.
    pub async fn reconnect_if_needed(&self) -> RelayResult<bool> {
        match self.state().await {
            ConnectionState::Disconnected { intentional: false } => {
                info!("Re-establishing upstream connection");
                self.connect().await?;
                Ok(true)
            }
            ConnectionState::Disconnected { intentional: true } => {
                debug!("Upstream disconnected intentionally, not reconnecting");
                Ok(false)
            }
            ConnectionState::Connecting | ConnectionState::Connected => Ok(false),
        }
    }

    /// Whether the upstream connection is live.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// Number of messages waiting for a connection.
    pub async fn pending(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    /// Drop the current connection after a transport failure.
    fn abandon_connection(&self, inner: &mut ManagerInner, intentional: bool) {
        inner.sink = None;
        if let Some(reader) = inner.reader.take() {
            reader.abort();
        }
        inner.generation += 1;
        inner.state = ConnectionState::Disconnected { intentional };
        self.connected.store(false, Ordering::SeqCst);
    }

    fn spawn_reader(&self, mut stream: UpstreamStream, generation: u64) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let connected = self.connected.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut reason = None;

            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(raw) => {
                        let envelope = match serde_json::from_str::<Value>(&raw) {
                            Ok(value) => Some(value),
                            Err(e) => {
                                error!("Error parsing upstream message: {}", e);
                                None
                            }
                        };
                        if events
                            .send(UpstreamEvent::Message { raw, envelope })
                            .await
                            .is_err()
                        {
                            debug!("Relay session gone, stopping upstream reader");
                            return;
                        }
                    }
                    Err(e) => {
                        error!("Upstream WebSocket error: {}", e);
                        reason = Some(e.to_string());
                        break;
                    }
                }
            }

            let dropped = {
                let mut guard = inner.lock().await;
                if guard.generation == generation && guard.state == ConnectionState::Connected {
                    guard.sink = None;
                    guard.reader = None;
                    guard.generation += 1;
                    guard.state = ConnectionState::Disconnected { intentional: false };
                    connected.store(false, Ordering::SeqCst);
                    true
                } else {
                    false
                }
            };

            if dropped {
                info!("Upstream WebSocket connection closed");
                let _ = events.send(UpstreamEvent::Dropped { reason }).await;
            }
        })
    }
}
