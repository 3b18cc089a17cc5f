//! Relay WebSocket handler
//!
//! Upgrades the client connection and runs one relay session over it. The
//! axum socket is split into a sink and a source that plug into the session's
//! transport traits.

use async_trait::async_trait;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::core::relay::{
    DownstreamSink, DownstreamSource, RelayError, RelayOutgoingMessage, RelayResult, RelaySession,
};
use crate::state::AppState;

/// Maximum WebSocket frame size (10 MB)
const MAX_WS_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Maximum WebSocket message size (10 MB)
const MAX_WS_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Relay WebSocket handler
///
/// Each accepted socket runs exactly one relay session with its own upstream
/// connection.
pub async fn relay_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("Relay WebSocket connection upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_relay_socket(socket, state))
}

async fn handle_relay_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let active = app_state.session_opened();
    info!(active_sessions = active, "Client connected");

    let (sender, receiver) = socket.split();
    let mut sink = WsDownstreamSink::new(sender);
    let source = WsDownstreamSource::new(receiver);

    match app_state.connector() {
        Ok(connector) => {
            let session =
                RelaySession::new(Arc::new(connector), Box::new(sink), app_state.session_settings());
            let report = session.run(source).await;
            debug!(?report, "Relay session report");
        }
        Err(e) => {
            error!("Failed to create upstream connector: {}", e);
            let notice = RelayOutgoingMessage::error("Server error", Some(e.to_string()));
            if sink.send_text(notice.to_json()).await.is_ok() {
                let _ = sink.close().await;
            }
        }
    }

    let active = app_state.session_closed();
    info!(active_sessions = active, "Client disconnected");
}

/// Client-bound half of an axum WebSocket.
pub struct WsDownstreamSink {
    sender: SplitSink<WebSocket, Message>,
    open: bool,
}

impl WsDownstreamSink {
    pub fn new(sender: SplitSink<WebSocket, Message>) -> Self {
        Self { sender, open: true }
    }

    async fn send(&mut self, message: Message) -> RelayResult<()> {
        if !self.open {
            return Err(RelayError::DownstreamTransport(
                "client connection is closed".to_string(),
            ));
        }
        let result = self.sender.send(message).await;
        if result.is_err() {
            self.open = false;
        }
        result.map_err(|e| RelayError::DownstreamTransport(e.to_string()))
    }
}

#[async_trait]
impl DownstreamSink for WsDownstreamSink {
    async fn send_text(&mut self, text: String) -> RelayResult<()> {
        self.send(Message::Text(text.into())).await
    }

    async fn ping(&mut self) -> RelayResult<()> {
        self.send(Message::Ping(Bytes::new())).await
    }

    async fn close(&mut self) -> RelayResult<()> {
        if !self.open {
            return Ok(());
        }
        let result = self.send(Message::Close(None)).await;
        self.open = false;
        result
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// Client-originated half of an axum WebSocket.
///
/// Yields text frames; binary frames are ignored and control frames are
/// handled by axum.
pub struct WsDownstreamSource {
    receiver: SplitStream<WebSocket>,
}

impl WsDownstreamSource {
    pub fn new(receiver: SplitStream<WebSocket>) -> Self {
        Self { receiver }
    }
}

#[async_trait]
impl DownstreamSource for WsDownstreamSource {
    async fn recv(&mut self) -> Option<RelayResult<String>> {
        loop {
            match self.receiver.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => {
                    debug!(bytes = data.len(), "Ignoring binary frame from client");
                }
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Client sent close frame");
                    return None;
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => return Some(Err(RelayError::DownstreamTransport(e.to_string()))),
            }
        }
    }
}
