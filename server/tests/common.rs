//! Common utilities for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, connect_async, MaybeTlsStream, WebSocketStream};

use server::config::ServerConfig;
use server::AppState;
use tts_stream::WsConnector;

pub type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const TEST_API_KEY: &str = "test-key";

/// Config pointing at a fake provider, with a credential and a default voice.
pub fn test_config(provider_url: &str) -> ServerConfig {
    ServerConfig {
        tts_stream_url: provider_url.to_string(),
        tts_api_key: Some(TEST_API_KEY.to_string()),
        default_voice_id: Some("v1".to_string()),
        ..ServerConfig::default()
    }
}

pub fn test_state(config: ServerConfig) -> AppState {
    let connector = Arc::new(WsConnector::new(config.connector_config()));
    AppState::new(config, connector)
}

/// Create a test app instance
pub fn create_test_app(config: ServerConfig) -> (axum::Router, AppState) {
    let state = test_state(config);
    let app = server::app(state.clone()).expect("router");
    (app, state)
}

/// Serve the orchestrator on an ephemeral port.
pub async fn spawn_server(config: ServerConfig) -> (SocketAddr, AppState) {
    let (app, state) = create_test_app(config);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

pub async fn connect_client(addr: SocketAddr, query: &str) -> ClientSocket {
    let (ws, _) = connect_async(format!("ws://{addr}/ws{query}"))
        .await
        .expect("client connect");
    ws
}

pub async fn send_json(ws: &mut ClientSocket, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next JSON event from the orchestrator, skipping control frames.
pub async fn next_event(ws: &mut ClientSocket) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).unwrap(),
                Some(Ok(Message::Close(frame))) => panic!("connection closed: {frame:?}"),
                Some(Ok(_)) => continue,
                other => panic!("expected an event, got {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Wait until the orchestrator closes the connection.
pub async fn expect_closed(ws: &mut ClientSocket) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(Message::Text(text))) => panic!("unexpected event after close: {text}"),
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .expect("connection was not closed")
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held")
}

/// What the fake provider saw on one connection.
#[derive(Debug)]
pub struct ProviderCall {
    pub uri: String,
    pub api_key: Option<String>,
    pub text: String,
    /// Resolves when the orchestrator closes this connection.
    pub closed: tokio::sync::oneshot::Receiver<()>,
}

/// Minimal streaming TTS provider.
///
/// Every connection reads the text and the end-of-input marker, replies with
/// `frames` and then either keeps the connection open until the client
/// closes it or closes it normally.
pub struct FakeProvider {
    pub url: String,
    pub calls: mpsc::UnboundedReceiver<ProviderCall>,
}

impl FakeProvider {
    pub async fn start(frames: Vec<String>, hold_open: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/v1/stream", listener.local_addr().unwrap());
        let (calls_tx, calls) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((tcp, _)) = listener.accept().await {
                let frames = frames.clone();
                let calls_tx = calls_tx.clone();
                tokio::spawn(serve_connection(tcp, frames, hold_open, calls_tx));
            }
        });

        Self { url, calls }
    }

    pub async fn next_call(&mut self) -> ProviderCall {
        tokio::time::timeout(Duration::from_secs(5), self.calls.recv())
            .await
            .expect("provider was never called")
            .unwrap()
    }
}

async fn serve_connection(
    tcp: TcpStream,
    frames: Vec<String>,
    hold_open: bool,
    calls: mpsc::UnboundedSender<ProviderCall>,
) {
    let mut uri = String::new();
    let mut api_key = None;
    let accepted = accept_hdr_async(tcp, |req: &Request, resp: Response| {
        uri = req.uri().to_string();
        api_key = req
            .headers()
            .get("xi-api-key")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(resp)
    })
    .await;
    let Ok(mut ws) = accepted else { return };

    let mut text = String::new();
    while let Some(Ok(msg)) = ws.next().await {
        if let Message::Text(body) = msg {
            let value: Value = serde_json::from_str(body.as_str()).unwrap_or(Value::Null);
            match value["text"].as_str() {
                Some("") => break,
                Some(chunk) => text.push_str(chunk),
                None => {}
            }
        }
    }

    let (closed_tx, closed) = tokio::sync::oneshot::channel();
    let _ = calls.send(ProviderCall {
        uri,
        api_key,
        text,
        closed,
    });

    for frame in frames {
        if ws.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }

    if hold_open {
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
        let _ = closed_tx.send(());
    } else {
        let _ = ws.close(None).await;
    }
}

pub fn timestamp_frame(t_ms: u64, phoneme: &str) -> String {
    serde_json::json!({ "type": "timestamp", "t_ms": t_ms, "phoneme": phoneme }).to_string()
}

pub fn audio_frame(data_base64: &str) -> String {
    serde_json::json!({ "type": "audio_chunk", "data": data_base64 }).to_string()
}

pub fn final_frame() -> String {
    r#"{"type":"final"}"#.to_string()
}
