//! OpenAI Realtime API connector.
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>`
//! - Protocol: WebSocket with JSON events
//! - Auth: `Authorization: Bearer <key>` plus `OpenAI-Beta: realtime=v1`

use async_trait::async_trait;
use futures::{SinkExt, StreamExt, future};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, header::AUTHORIZATION};
use tracing::debug;
use zeroize::Zeroize;

use super::base::{RelayError, RelayResult, UpstreamConnector, UpstreamLink};

/// OpenAI Realtime WebSocket endpoint
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Default realtime model
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-realtime";

/// Value of the `OpenAI-Beta` header
pub const OPENAI_BETA_HEADER: &str = "realtime=v1";

/// Opens authenticated WebSocket connections to the OpenAI Realtime API.
pub struct OpenAIRealtimeConnector {
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIRealtimeConnector {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> RelayResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RelayError::InvalidConfiguration(
                "API key is required".to_string(),
            ));
        }

        Ok(Self {
            api_key,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the WebSocket URL with model parameter.
    pub fn ws_url(&self) -> String {
        format!("{}?model={}", self.base_url, self.model)
    }
}

impl Drop for OpenAIRealtimeConnector {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

#[async_trait]
impl UpstreamConnector for OpenAIRealtimeConnector {
    async fn connect(&self) -> RelayResult<UpstreamLink> {
        let mut request = self
            .ws_url()
            .into_client_request()
            .map_err(|e| RelayError::UpstreamTransport(e.to_string()))?;

        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| RelayError::InvalidConfiguration(format!("Invalid API key: {e}")))?;
        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            HeaderName::from_static("openai-beta"),
            HeaderValue::from_static(OPENAI_BETA_HEADER),
        );

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| RelayError::UpstreamTransport(e.to_string()))?;

        let (ws_sink, ws_stream) = ws_stream.split();

        let sink = ws_sink
            .sink_map_err(|e| RelayError::UpstreamTransport(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, RelayError>(Message::Text(text.into()))));

        let stream = ws_stream.filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(data)) => String::from_utf8(data.to_vec()).ok().map(Ok),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WebSocket closed by upstream");
                    None
                }
                Ok(_) => None,
                Err(e) => Some(Err(RelayError::UpstreamTransport(e.to_string()))),
            })
        });

        Ok(UpstreamLink::new(Box::pin(sink), Box::pin(stream)))
    }

    fn endpoint(&self) -> String {
        self.ws_url()
    }
}
