//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check and model info endpoints
//! - `relay` - Client WebSocket relayed to the OpenAI Realtime API

pub mod api;
pub mod relay;

// Re-export commonly used handlers for convenient access
pub use relay::relay_handler;
