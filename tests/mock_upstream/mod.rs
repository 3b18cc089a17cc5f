//! Mock OpenAI Realtime server
//!
//! Speaks just enough of the realtime protocol for relay tests:
//! - sends `session.created` on every new connection
//! - answers `response.create` with `response.done` carrying cumulative usage
//!   that grows by 200 input / 100 output / 20 cached tokens per response
//! - `test.drop` closes the connection, `test.raw` replies with a non-JSON frame
//! - `test.empty_usage` replies with a `response.done` whose usage is `{}`
//! - while refusing, handshakes are rejected with 503
//!
//! Every received text frame and every handshake `Authorization` header is recorded.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

pub const USAGE_STEP: (u64, u64, u64) = (200, 100, 20);

#[derive(Default)]
pub struct MockUpstreamState {
    pub connection_count: AtomicU64,
    pub refusing: AtomicBool,
    pub received: Mutex<Vec<String>>,
    pub auth_headers: Mutex<Vec<String>>,
    pub beta_headers: Mutex<Vec<String>>,
    pub request_uris: Mutex<Vec<String>>,
}

impl MockUpstreamState {
    pub fn connections(&self) -> u64 {
        self.connection_count.load(Ordering::SeqCst)
    }

    /// Reject (or accept again) new handshakes.
    pub fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().unwrap().clone()
    }

    /// Received frames with the given `type`.
    pub fn received_of_type(&self, kind: &str) -> Vec<Value> {
        self.received()
            .iter()
            .filter_map(|raw| serde_json::from_str::<Value>(raw).ok())
            .filter(|v| v["type"] == kind)
            .collect()
    }

    /// Poll until `n` frames have been received or the timeout elapses.
    pub async fn wait_for_received(&self, n: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.received.lock().unwrap().len() >= n {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }
}

pub struct MockUpstream {
    pub addr: SocketAddr,
    pub state: Arc<MockUpstreamState>,
    handle: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(MockUpstreamState::default());

        let accept_state = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, state).await;
                });
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    /// Base URL to hand to the connector (the model is appended by it).
    pub fn url(&self) -> String {
        format!("ws://{}/v1/realtime", self.addr)
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<MockUpstreamState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let header_state = state.clone();
    let callback = move |req: &Request, resp: Response| {
        if header_state.refusing.load(Ordering::SeqCst) {
            let mut refused = ErrorResponse::new(Some("refusing connections".to_string()));
            *refused.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
            return Err(refused);
        }
        let header = |name: &str| {
            req.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        header_state
            .auth_headers
            .lock()
            .unwrap()
            .push(header("authorization"));
        header_state
            .beta_headers
            .lock()
            .unwrap()
            .push(header("openai-beta"));
        header_state
            .request_uris
            .lock()
            .unwrap()
            .push(req.uri().to_string());
        Ok::<_, ErrorResponse>(resp)
    };

    let ws_stream = accept_hdr_async(stream, callback).await?;
    let (mut write, mut read) = ws_stream.split();

    let conn_id = state.connection_count.fetch_add(1, Ordering::SeqCst) + 1;

    let created = json!({
        "type": "session.created",
        "session": {"id": format!("sess_mock_{conn_id}"), "model": "gpt-realtime"}
    });
    write.send(Message::Text(created.to_string().into())).await?;

    let mut responses: u64 = 0;

    while let Some(msg) = read.next().await {
        let text = match msg? {
            Message::Text(text) => text.as_str().to_owned(),
            Message::Close(_) => break,
            _ => continue,
        };
        state.received.lock().unwrap().push(text.clone());

        let kind = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v["type"].as_str().map(str::to_owned))
            .unwrap_or_default();

        match kind.as_str() {
            "response.create" => {
                responses += 1;
                let (input, output, cached) = USAGE_STEP;
                let done = json!({
                    "type": "response.done",
                    "response": {
                        "id": format!("resp_{responses}"),
                        "status": "completed",
                        "usage": {
                            "total_tokens": (input + output) * responses,
                            "input_tokens": input * responses,
                            "output_tokens": output * responses,
                            "input_token_details": {"cached_tokens": cached * responses}
                        }
                    }
                });
                write.send(Message::Text(done.to_string().into())).await?;
            }
            "test.empty_usage" => {
                let done = json!({
                    "type": "response.done",
                    "response": {"id": "resp_empty", "status": "cancelled", "usage": {}}
                });
                write.send(Message::Text(done.to_string().into())).await?;
            }
            "test.raw" => {
                write.send(Message::Text("not json at all".into())).await?;
            }
            "test.drop" => {
                write.send(Message::Close(None)).await?;
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
