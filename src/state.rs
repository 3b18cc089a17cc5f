use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::{ServerConfig, TokenPricing};
use crate::core::relay::{OpenAIRealtimeConnector, RelayResult, SessionSettings};

/// Application state shared by all handlers.
///
/// Holds configuration only; every relay session owns its own connections
/// and ledger.
pub struct AppState {
    pub config: ServerConfig,
    pricing: TokenPricing,
    active_sessions: AtomicUsize,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        let pricing = config.realtime_pricing();
        Arc::new(Self {
            config,
            pricing,
            active_sessions: AtomicUsize::new(0),
        })
    }

    /// Rates for the configured model
    pub fn pricing(&self) -> TokenPricing {
        self.pricing
    }

    /// Upstream WebSocket URL including the model parameter
    pub fn websocket_url(&self) -> String {
        format!(
            "{}?model={}",
            self.config.openai_realtime_url, self.config.openai_model
        )
    }

    /// Build a connector for a new relay session.
    pub fn connector(&self) -> RelayResult<OpenAIRealtimeConnector> {
        OpenAIRealtimeConnector::new(
            self.config.openai_api_key.clone(),
            self.config.openai_realtime_url.clone(),
            self.config.openai_model.clone(),
        )
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            probe_interval: self.config.heartbeat_interval(),
            pricing: self.pricing,
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    pub(crate) fn session_opened(&self) -> usize {
        self.active_sessions.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn session_closed(&self) -> usize {
        self.active_sessions
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1)
    }
}
