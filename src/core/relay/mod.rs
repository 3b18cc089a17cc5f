//! Voice relay between a browser client and the OpenAI Realtime API.
//!
//! # Architecture
//!
//! ```text
//! Client WebSocket <--> RelaySession <--> UpstreamManager <--> OpenAI Realtime
//!                           |
//!                      CostLedger, LivenessProber
//! ```
//!
//! Each accepted client gets its own [`RelaySession`] with its own upstream
//! connection. Nothing is shared between sessions.

pub mod base;
pub mod ledger;
pub mod messages;
pub mod openai;
pub mod prober;
pub mod session;
pub mod upstream;

pub use base::{
    DownstreamSink, DownstreamSource, RelayError, RelayResult, UpstreamConnector, UpstreamLink,
    UpstreamSink, UpstreamStream,
};
pub use ledger::{CostData, CostLedger, UsageSnapshot};
pub use messages::{Envelope, MessageType, RelayOutgoingMessage};
pub use openai::{
    DEFAULT_REALTIME_MODEL, OPENAI_BETA_HEADER, OPENAI_REALTIME_URL, OpenAIRealtimeConnector,
};
pub use prober::{DEFAULT_PROBE_INTERVAL, LivenessProber};
pub use session::{CloseReason, RelaySession, SessionReport, SessionSettings, SessionState};
pub use upstream::{ConnectionState, SendOutcome, UpstreamEvent, UpstreamManager};
