pub mod relay;

// Re-export commonly used types for convenience
pub use relay::{
    ConnectionState, CostData, CostLedger, OpenAIRealtimeConnector, RelayError, RelayResult,
    RelaySession, SessionSettings, SessionState, UpstreamConnector, UpstreamManager,
    UsageSnapshot,
};
