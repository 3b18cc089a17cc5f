//! Relay session: one client connection bridged to one upstream connection.
//!
//! The session runs three concurrent activities:
//!
//! - the router loop below, which receives client frames and upstream events
//! - the upstream reader owned by [`UpstreamManager`], publishing onto a channel
//! - the [`LivenessProber`], pinging the client
//!
//! Only the router touches the [`CostLedger`]; only the manager touches the
//! connection state and pending queue.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::base::{
    DownstreamSink, DownstreamSource, RelayError, RelayResult, UpstreamConnector,
};
use super::ledger::{CostLedger, UsageSnapshot};
use super::messages::{Envelope, MessageType, RelayOutgoingMessage};
use super::prober::{DEFAULT_PROBE_INTERVAL, LivenessProber, SharedDownstream};
use super::upstream::{SendOutcome, UpstreamEvent, UpstreamManager};
use crate::config::pricing::TokenPricing;

/// Channel buffer between the upstream reader and the router
const UPSTREAM_EVENT_BUFFER: usize = 1024;

/// Upper bound on waiting for owned tasks during teardown
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

const CONNECTION_ESTABLISHED_MESSAGE: &str = "Connected to OpenAI Realtime API";

/// Lifecycle of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Closing,
    Closed,
}

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Interval between client liveness probes
    pub probe_interval: Duration,
    /// Token rates for the configured model
    pub pricing: TokenPricing,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            probe_interval: DEFAULT_PROBE_INTERVAL,
            pricing: TokenPricing::default(),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    ClientDisconnected,
    ProbeFailed,
    DownstreamError(String),
    UpstreamConnectFailed(String),
}

/// Summary returned when a session has closed.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub reason: CloseReason,
    pub total_cost: f64,
    pub last_usage: UsageSnapshot,
}

/// A relay session for one client connection.
pub struct RelaySession {
    state: SessionState,
    upstream: UpstreamManager,
    upstream_events: mpsc::Receiver<UpstreamEvent>,
    downstream: SharedDownstream,
    ledger: CostLedger,
    settings: SessionSettings,
    cancel: CancellationToken,
    established_sent: bool,
}

impl RelaySession {
    pub fn new(
        connector: Arc<dyn UpstreamConnector>,
        downstream: Box<dyn DownstreamSink>,
        settings: SessionSettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(UPSTREAM_EVENT_BUFFER);

        Self {
            state: SessionState::Idle,
            upstream: UpstreamManager::new(connector, events_tx),
            upstream_events: events_rx,
            downstream: Arc::new(Mutex::new(downstream)),
            ledger: CostLedger::new(settings.pricing),
            settings,
            cancel: CancellationToken::new(),
            established_sent: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session until the client leaves or a fatal error occurs.
    pub async fn run<S: DownstreamSource>(mut self, mut source: S) -> SessionReport {
        let mut prober = None;
        let reason = match self.start().await {
            Ok(()) => {
                prober = Some(LivenessProber::spawn(
                    self.downstream.clone(),
                    self.settings.probe_interval,
                    self.cancel.clone(),
                ));
                self.route(&mut source).await
            }
            Err(reason) => reason,
        };

        self.teardown(prober).await;

        let report = SessionReport {
            reason,
            total_cost: self.ledger.session_cost(),
            last_usage: self.ledger.last_snapshot(),
        };
        info!(
            reason = ?report.reason,
            total_cost = report.total_cost,
            "Relay session closed"
        );
        report
    }

    /// Idle -> Active: first upstream connect and the `connection.established` notice.
    async fn start(&mut self) -> Result<(), CloseReason> {
        if let Err(e) = self.upstream.connect().await {
            error!("WebSocket error: {}", e);
            let notice = RelayOutgoingMessage::error("Server error", Some(e.to_string()));
            if let Err(send_err) = self.send_to_client(&notice).await {
                debug!("Could not report connect failure to client: {}", send_err);
            }
            return Err(CloseReason::UpstreamConnectFailed(e.to_string()));
        }

        if !self.established_sent {
            let notice = RelayOutgoingMessage::ConnectionEstablished {
                message: CONNECTION_ESTABLISHED_MESSAGE.to_string(),
            };
            self.send_to_client(&notice)
                .await
                .map_err(|e| CloseReason::DownstreamError(e.to_string()))?;
            self.established_sent = true;
        }

        self.state = SessionState::Active;
        info!("Relay session active");
        Ok(())
    }

    async fn route<S: DownstreamSource>(&mut self, source: &mut S) -> CloseReason {
        let cancel = self.cancel.clone();

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    return CloseReason::ProbeFailed;
                }
                Some(event) = self.upstream_events.recv() => {
                    self.on_upstream_event(event).await
                }
                frame = source.recv() => match frame {
                    Some(Ok(raw)) => self.on_client_message(&raw).await,
                    Some(Err(e)) => {
                        warn!("Client WebSocket error: {}", e);
                        return CloseReason::DownstreamError(e.to_string());
                    }
                    None => {
                        info!("Client disconnected");
                        return CloseReason::ClientDisconnected;
                    }
                },
            };

            match result {
                Err(e) if e.is_fatal() => {
                    error!("Failed to deliver message to client: {}", e);
                    return CloseReason::DownstreamError(e.to_string());
                }
                Err(e) => warn!("Relay error: {}", e),
                Ok(()) => {}
            }
        }
    }

    /// Active -> Closing -> Closed.
    async fn teardown(&mut self, prober: Option<LivenessProber>) {
        self.state = SessionState::Closing;
        self.cancel.cancel();

        if let Some(prober) = prober {
            prober.join(TASK_SHUTDOWN_TIMEOUT).await;
        }
        self.upstream.disconnect(true).await;

        let mut downstream = self.downstream.lock().await;
        if downstream.is_open()
            && let Err(e) = downstream.close().await
        {
            debug!("Error closing client connection: {}", e);
        }

        self.state = SessionState::Closed;
    }

    async fn on_upstream_event(&mut self, event: UpstreamEvent) -> RelayResult<()> {
        match event {
            UpstreamEvent::Message {
                raw,
                envelope: Some(envelope),
            } => self.on_upstream_message(raw, &envelope).await,
            UpstreamEvent::Message {
                raw,
                envelope: None,
            } => {
                self.send_to_client(&RelayOutgoingMessage::Raw { data: raw })
                    .await
            }
            UpstreamEvent::Dropped { reason } => self.on_upstream_dropped(reason).await,
        }
    }

    /// Apply upstream side effects, then forward the upstream frame verbatim.
    async fn on_upstream_message(&mut self, raw: String, message: &Value) -> RelayResult<()> {
        let kind = message
            .get("type")
            .and_then(Value::as_str)
            .map(MessageType::parse);

        match kind {
            Some(MessageType::Error) => {
                error!("OpenAI Error: {}", message);
            }
            Some(MessageType::SessionCreated) => {
                let session_id = str_at(message, "/session/id");
                let model = str_at(message, "/session/model");
                info!(session_id, model, "Upstream session created");
                self.ledger.reset();
                info!("Cost tracking reset for new session");
            }
            Some(MessageType::ResponseDone) => {
                if let Some(usage) = message
                    .pointer("/response/usage")
                    .and_then(UsageSnapshot::from_usage)
                {
                    let incremental = self.ledger.update(usage);
                    info!(
                        "Cost Update - Incremental: ${:.6}, Total: ${:.6}",
                        incremental,
                        self.ledger.session_cost()
                    );
                    let update = RelayOutgoingMessage::CostUpdate {
                        cost: self.ledger.cost_data(),
                    };
                    self.send_to_client(&update).await?;
                }
                debug!("OpenAI Event: response.done");
            }
            Some(MessageType::ResponseCreated) => {
                let model = str_at(message, "/response/model");
                info!(model, "Response created");
            }
            Some(MessageType::ConversationItemCreated) => {
                debug!("OpenAI Event: conversation.item.created");
            }
            _ => {}
        }

        self.send_raw_to_client(raw).await
    }

    async fn on_upstream_dropped(&mut self, reason: Option<String>) -> RelayResult<()> {
        warn!(?reason, "Upstream connection dropped");
        let notice = RelayOutgoingMessage::ConnectionClosed {
            message: "OpenAI connection closed".to_string(),
            code: None,
            reason: reason.clone(),
        };
        self.send_to_client(&notice).await?;

        if let Err(e) = self.upstream.reconnect_if_needed().await {
            error!("Failed to reconnect to OpenAI: {}", e);
            let notice = RelayOutgoingMessage::error(
                "OpenAI connection not available",
                Some(e.to_string()),
            );
            self.send_to_client(&notice).await?;
        }
        Ok(())
    }

    /// Handle one client frame.
    ///
    /// Only client-delivery failures are returned; everything else is reported
    /// to the client as an `error` envelope.
    async fn on_client_message(&mut self, raw: &str) -> RelayResult<()> {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("Error parsing client message: {}", e);
                let detail = match e {
                    RelayError::MalformedMessage(detail) => detail,
                    other => other.to_string(),
                };
                let notice = RelayOutgoingMessage::error("Error parsing message", Some(detail));
                return self.send_to_client(&notice).await;
            }
        };

        match envelope.message_type() {
            MessageType::SessionUpdate => {
                info!("Session update: {}", envelope.instructions_preview());
                if !self.upstream.is_connected()
                    && let Err(e) = self.upstream.reconnect_if_needed().await
                {
                    error!("Failed to reconnect to OpenAI: {}", e);
                    let notice = RelayOutgoingMessage::error(
                        "OpenAI connection not available",
                        Some(e.to_string()),
                    );
                    self.send_to_client(&notice).await?;
                }
            }
            MessageType::ResponseCreate => {
                info!("Response requested");
            }
            MessageType::SessionDisconnect => {
                info!("Client requested session disconnect");
                self.upstream.disconnect(true).await;
                return Ok(());
            }
            _ => {}
        }

        self.forward_upstream(raw.to_string()).await
    }

    async fn forward_upstream(&mut self, payload: String) -> RelayResult<()> {
        match self.upstream.send(payload).await {
            Ok(SendOutcome::Sent) => Ok(()),
            Ok(SendOutcome::Queued) => {
                debug!("Upstream not connected, message queued");
                Ok(())
            }
            Err(RelayError::UpstreamUnavailable(detail)) => {
                error!("OpenAI WebSocket not available: {}", detail);
                let notice = RelayOutgoingMessage::error("OpenAI connection not available", None);
                self.send_to_client(&notice).await
            }
            Err(e) => {
                // The manager re-queued the payload; try to bring the link back.
                warn!("Upstream send failed: {}", e);
                if let Err(reconnect_err) = self.upstream.reconnect_if_needed().await {
                    error!("Failed to reconnect to OpenAI: {}", reconnect_err);
                    let notice = RelayOutgoingMessage::error(
                        "OpenAI connection not available",
                        Some(reconnect_err.to_string()),
                    );
                    self.send_to_client(&notice).await?;
                }
                Ok(())
            }
        }
    }

    async fn send_to_client(&self, message: &RelayOutgoingMessage) -> RelayResult<()> {
        self.send_raw_to_client(message.to_json()).await
    }

    async fn send_raw_to_client(&self, text: String) -> RelayResult<()> {
        let mut downstream = self.downstream.lock().await;
        downstream.send_text(text).await.map_err(|e| match e {
            RelayError::DownstreamTransport(_) => e,
            other => RelayError::DownstreamTransport(other.to_string()),
        })
    }
}

/// String at `pointer` in `message`, or "Unknown".
fn str_at<'a>(message: &'a Value, pointer: &str) -> &'a str {
    message
        .pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
}
