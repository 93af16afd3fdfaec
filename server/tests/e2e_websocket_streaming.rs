//! End-to-end tests: client WebSocket -> orchestrator -> fake streaming provider.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Error as WsError;

use common::*;

fn speak(text: &str) -> serde_json::Value {
    json!({ "type": "speak", "voice_id": "v1", "text": text })
}

#[tokio::test]
async fn test_speak_streams_visemes_and_audio() {
    let mut provider = FakeProvider::start(
        vec![
            timestamp_frame(0, "a"),
            audio_frame("aGVsbG8="),
            final_frame(),
        ],
        true,
    )
    .await;
    let (addr, state) = spawn_server(test_config(&provider.url)).await;
    let mut client = connect_client(addr, "?avatar_id=anna").await;

    send_json(&mut client, speak("hallo welt")).await;

    let viseme = next_event(&mut client).await;
    assert_eq!(viseme["type"], "viseme");
    assert_eq!(viseme["t_ms"], 0);
    assert!(viseme["weights"]["AI"].as_f64().unwrap() > 0.0);

    let audio = next_event(&mut client).await;
    assert_eq!(audio, json!({ "type": "audio", "data": "aGVsbG8=", "format": "mp3" }));

    let call = provider.next_call().await;
    assert_eq!(call.text, "hallo welt");
    assert_eq!(call.api_key.as_deref(), Some(TEST_API_KEY));
    assert!(call.uri.ends_with("voice_id=v1"), "{}", call.uri);

    eventually(|| state.metrics.visemes_forwarded.load(Ordering::Relaxed) == 1).await;
    assert_eq!(state.metrics.audio_chunks_forwarded.load(Ordering::Relaxed), 1);
    assert_eq!(state.sessions.list()[0].avatar_id.as_deref(), Some("anna"));
}

#[tokio::test]
async fn test_default_voice_is_used_when_omitted() {
    let mut provider = FakeProvider::start(vec![final_frame()], false).await;
    let (addr, _) = spawn_server(test_config(&provider.url)).await;
    let mut client = connect_client(addr, "?voice_id=narrator_2").await;

    send_json(&mut client, json!({ "type": "speak", "text": "hi" })).await;
    let call = provider.next_call().await;
    assert!(call.uri.ends_with("voice_id=narrator_2"), "{}", call.uri);
}

#[tokio::test]
async fn test_stop_sends_done_and_closes() {
    let mut provider = FakeProvider::start(vec![timestamp_frame(0, "m")], true).await;
    let (addr, state) = spawn_server(test_config(&provider.url)).await;
    let mut client = connect_client(addr, "").await;

    send_json(&mut client, speak("a long sentence")).await;
    assert_eq!(next_event(&mut client).await["type"], "viseme");
    let call = provider.next_call().await;

    send_json(&mut client, json!({ "type": "stop" })).await;
    assert_eq!(next_event(&mut client).await, json!({ "type": "done" }));
    expect_closed(&mut client).await;

    // upstream connection is released too
    tokio::time::timeout(Duration::from_secs(5), call.closed)
        .await
        .expect("provider connection left open")
        .unwrap();
    eventually(|| state.sessions.is_empty()).await;
}

#[tokio::test]
async fn test_barge_in_replaces_current_speech() {
    let mut provider = FakeProvider::start(vec![timestamp_frame(0, "o")], true).await;
    let (addr, state) = spawn_server(test_config(&provider.url)).await;
    let mut client = connect_client(addr, "").await;

    send_json(&mut client, speak("first")).await;
    assert_eq!(next_event(&mut client).await["type"], "viseme");
    let first = provider.next_call().await;
    assert_eq!(first.text, "first");

    send_json(&mut client, speak("second")).await;
    let second = provider.next_call().await;
    assert_eq!(second.text, "second");

    tokio::time::timeout(Duration::from_secs(5), first.closed)
        .await
        .expect("superseded stream left open")
        .unwrap();

    let viseme = next_event(&mut client).await;
    assert_eq!(viseme["type"], "viseme");
    assert_eq!(state.metrics.barge_ins.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_missing_credential_is_reported() {
    let provider = FakeProvider::start(vec![final_frame()], false).await;
    let config = server::config::ServerConfig {
        tts_api_key: None,
        ..test_config(&provider.url)
    };
    let (addr, state) = spawn_server(config).await;
    let mut client = connect_client(addr, "").await;

    send_json(&mut client, speak("hello")).await;
    let event = next_event(&mut client).await;
    assert_eq!(event["type"], "error");
    assert!(event["message"].as_str().unwrap().contains("credential"));

    // session survives the failure
    send_json(&mut client, json!({ "type": "stop" })).await;
    assert_eq!(next_event(&mut client).await["type"], "done");
    assert_eq!(state.metrics.upstream_failures.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_invalid_client_messages() {
    let provider = FakeProvider::start(vec![], false).await;
    let (addr, _) = spawn_server(test_config(&provider.url)).await;
    let mut client = connect_client(addr, "").await;

    send_json(&mut client, json!({ "type": "dance" })).await;
    assert_eq!(next_event(&mut client).await["type"], "error");

    send_json(&mut client, json!({ "type": "speak", "text": "" })).await;
    assert_eq!(next_event(&mut client).await["type"], "error");

    send_json(&mut client, json!({ "type": "stop" })).await;
    assert_eq!(next_event(&mut client).await["type"], "done");
}

#[tokio::test]
async fn test_invalid_voice_rejected_at_upgrade() {
    let provider = FakeProvider::start(vec![], false).await;
    let (addr, _) = spawn_server(test_config(&provider.url)).await;

    match connect_async(format!("ws://{addr}/ws?voice_id=bad%20voice")).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 400),
        other => panic!("expected HTTP 400, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_disconnect_removes_session() {
    let mut provider = FakeProvider::start(vec![timestamp_frame(0, "e")], true).await;
    let (addr, state) = spawn_server(test_config(&provider.url)).await;
    let mut client = connect_client(addr, "").await;

    send_json(&mut client, speak("bye")).await;
    assert_eq!(next_event(&mut client).await["type"], "viseme");
    let call = provider.next_call().await;
    assert_eq!(state.sessions.len(), 1);

    drop(client);

    eventually(|| state.sessions.is_empty()).await;
    tokio::time::timeout(Duration::from_secs(5), call.closed)
        .await
        .expect("provider connection left open")
        .unwrap();
    assert_eq!(state.metrics.sessions_active.load(Ordering::Relaxed), 0);
    assert_eq!(state.metrics.sessions_opened.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_idle_session_is_closed() {
    let provider = FakeProvider::start(vec![], false).await;
    let config = server::config::ServerConfig {
        idle_timeout_ms: 200,
        ..test_config(&provider.url)
    };
    let (addr, state) = spawn_server(config).await;
    let mut client = connect_client(addr, "").await;

    assert_eq!(next_event(&mut client).await, json!({ "type": "done" }));
    expect_closed(&mut client).await;
    assert_eq!(state.metrics.idle_timeouts.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_debug_observer_receives_copies() {
    let mut provider = FakeProvider::start(vec![timestamp_frame(0, "f")], true).await;
    let config = server::config::ServerConfig {
        debug_observers: true,
        ..test_config(&provider.url)
    };
    let (addr, state) = spawn_server(config).await;
    let mut client = connect_client(addr, "").await;
    eventually(|| state.sessions.len() == 1).await;
    let id = state.sessions.list()[0].id;

    let (mut observer, _) = connect_async(format!("ws://{addr}/debug/sessions/{id}/events"))
        .await
        .unwrap();

    send_json(&mut client, speak("fun")).await;
    let delivered = next_event(&mut client).await;
    let observed = next_event(&mut observer).await;
    assert_eq!(delivered, observed);
    assert_eq!(observed["type"], "viseme");
    let _ = provider.next_call().await;
}

#[tokio::test]
async fn test_debug_observer_disabled() {
    let provider = FakeProvider::start(vec![], false).await;
    let (addr, state) = spawn_server(test_config(&provider.url)).await;
    let _client = connect_client(addr, "").await;
    eventually(|| state.sessions.len() == 1).await;
    let id = state.sessions.list()[0].id;

    match connect_async(format!("ws://{addr}/debug/sessions/{id}/events")).await {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 404),
        other => panic!("expected HTTP 404, got {:?}", other.map(|_| ())),
    }
}
