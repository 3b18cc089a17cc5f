//! Base traits and types for the relay session.
//!
//! The relay only needs a narrow capability set from either side of the bridge:
//! send a text frame, receive a text frame (or learn that the peer is gone),
//! and, on the client side, probe liveness. These traits are the seams where the
//! axum WebSocket and the tokio-tungstenite upstream client plug in, and where
//! tests substitute in-memory transports.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while relaying a session.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RelayError {
    /// Connect, send or receive failure on the upstream API connection
    #[error("Upstream transport error: {0}")]
    UpstreamTransport(String),

    /// Send or receive failure on the client connection
    #[error("Downstream transport error: {0}")]
    DownstreamTransport(String),

    /// Payload failed to parse as a message envelope
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Send attempted while the upstream is intentionally disconnected
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl RelayError {
    /// Whether this error must end the session.
    ///
    /// Only losing the client connection is fatal; upstream trouble is reported
    /// to the client and the session keeps running.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::DownstreamTransport(_))
    }
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

// =============================================================================
// Upstream Transport
// =============================================================================

/// Outbound half of an upstream connection.
pub type UpstreamSink = Pin<Box<dyn Sink<String, Error = RelayError> + Send>>;

/// Inbound half of an upstream connection. Ends when the connection closes.
pub type UpstreamStream = Pin<Box<dyn Stream<Item = RelayResult<String>> + Send>>;

/// A freshly opened upstream connection, already split into its two halves.
pub struct UpstreamLink {
    pub sink: UpstreamSink,
    pub stream: UpstreamStream,
}

impl UpstreamLink {
    pub fn new(sink: UpstreamSink, stream: UpstreamStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens upstream connections on behalf of an [`UpstreamManager`](super::UpstreamManager).
///
/// Implementations perform a single attempt and report failure immediately;
/// retry policy belongs to the caller.
#[async_trait]
pub trait UpstreamConnector: Send + Sync {
    /// Open a new authenticated connection.
    async fn connect(&self) -> RelayResult<UpstreamLink>;

    /// Human readable endpoint description for logs.
    fn endpoint(&self) -> String;
}

// =============================================================================
// Downstream Transport
// =============================================================================

/// Outbound half of the client connection.
#[async_trait]
pub trait DownstreamSink: Send {
    /// Send a text frame to the client.
    async fn send_text(&mut self, text: String) -> RelayResult<()>;

    /// Send a liveness probe (a WebSocket ping for real sockets).
    async fn ping(&mut self) -> RelayResult<()>;

    /// Close the client connection.
    async fn close(&mut self) -> RelayResult<()>;

    /// Whether the connection is still believed to be open.
    fn is_open(&self) -> bool;
}

/// Inbound half of the client connection.
#[async_trait]
pub trait DownstreamSource: Send {
    /// Receive the next text frame.
    ///
    /// Returns `None` once the client has disconnected.
    async fn recv(&mut self) -> Option<RelayResult<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_downstream_errors_are_fatal() {
        assert!(RelayError::DownstreamTransport("gone".into()).is_fatal());
        assert!(!RelayError::UpstreamTransport("reset".into()).is_fatal());
        assert!(!RelayError::MalformedMessage("bad".into()).is_fatal());
        assert!(!RelayError::UpstreamUnavailable("closed".into()).is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = RelayError::UpstreamUnavailable("intentional disconnect".into());
        assert_eq!(
            err.to_string(),
            "Upstream unavailable: intentional disconnect"
        );
    }
}
