//! Server Startup Tests
//!
//! HTTP routes via `oneshot`, and the full `/ws` relay path over a real
//! listener against the mock realtime server.

mod mock_upstream;

use std::sync::Arc;
use std::time::Duration;

use axum::{Router, body::Body, http::Request, http::StatusCode};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tower::util::ServiceExt;

use mock_upstream::MockUpstream;
use voice_relay::{ServerConfig, routes, state::AppState};

/// Helper function to create a minimal test configuration
fn create_minimal_config(realtime_url: &str, model: &str) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        tls: None,
        openai_api_key: "sk-test".to_string(),
        openai_model: model.to_string(),
        openai_realtime_url: realtime_url.to_string(),
        heartbeat_interval_secs: 30,
        cors_allowed_origins: Some("*".to_string()),
    }
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::api::create_api_router())
        .merge(routes::relay::create_relay_router())
        .with_state(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let state = AppState::new(create_minimal_config(
        "wss://api.openai.com/v1/realtime",
        "gpt-realtime",
    ));

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "ok", "message": "Server is running"})
    );
}

#[tokio::test]
async fn test_model_info_reports_model_and_pricing() {
    let state = AppState::new(create_minimal_config(
        "wss://api.openai.com/v1/realtime",
        "gpt-4o-mini-realtime-preview",
    ));

    let request = Request::builder()
        .uri("/model-info")
        .body(Body::empty())
        .unwrap();
    let response = app(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["configured_model"], "gpt-4o-mini-realtime-preview");
    assert_eq!(
        body["websocket_url"],
        "wss://api.openai.com/v1/realtime?model=gpt-4o-mini-realtime-preview"
    );
    assert_eq!(body["api_version"], "realtime=v1");
    assert_eq!(body["pricing"]["input_per_1k"], 0.01);
    assert_eq!(body["pricing"]["output_per_1k"], 0.02);
    assert_eq!(body["pricing"]["cached_per_1k"], 0.0003);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let state = AppState::new(create_minimal_config(
        "wss://api.openai.com/v1/realtime",
        "gpt-realtime",
    ));

    let request = Request::builder().uri("/nope").body(Body::empty()).unwrap();
    let response = app(state).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_websocket_relay_end_to_end() {
    let mock = MockUpstream::start().await;
    let state = AppState::new(create_minimal_config(&mock.url(), "gpt-realtime"));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_state = state.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app(server_state)).await.unwrap();
    });

    let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("client should connect to /ws");

    async fn next_json(
        client: &mut (impl StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
                  + Unpin),
    ) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("timed out")
                .expect("stream ended")
                .expect("websocket error");
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    assert_eq!(next_json(&mut client).await["type"], "connection.established");
    assert_eq!(next_json(&mut client).await["type"], "session.created");
    assert_eq!(state.active_sessions(), 1);

    client
        .send(Message::Text(json!({"type": "response.create"}).to_string().into()))
        .await
        .unwrap();

    let cost = next_json(&mut client).await;
    assert_eq!(cost["type"], "cost.update");
    assert_eq!(cost["cost"]["cachedTokens"], 20);
    assert_eq!(next_json(&mut client).await["type"], "response.done");

    client.close(None).await.unwrap();

    // Session teardown releases the slot
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while state.active_sessions() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(state.active_sessions(), 0);

    server.abort();
}
