//! Relay WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::relay::relay_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay WebSocket router
///
/// # Endpoint
///
/// `GET /ws` - WebSocket upgrade; one relay session per connection
///
/// # Protocol
///
/// Text frames carry OpenAI Realtime JSON events and are forwarded in both
/// directions. The relay adds its own events for the client:
///
/// ```json
/// {"type": "connection.established", "message": "Connected to OpenAI Realtime API"}
/// {"type": "cost.update", "cost": {"total": 0.012808, "inputTokens": 200, "outputTokens": 100, "cachedTokens": 20}}
/// {"type": "error", "message": "Error parsing message", "error": "..."}
/// {"type": "connection.closed", "message": "OpenAI connection closed"}
/// ```
///
/// Sending `{"type": "session.disconnect"}` closes the upstream connection
/// without closing the client socket.
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(relay_handler))
        .layer(TraceLayer::new_for_http())
}
