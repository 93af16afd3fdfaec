use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
    Json,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::delivery::{ClientSink, EventSink, ObservedSink, Outbound};
use crate::error::ApiError;
use crate::metrics::{MetricsResponse, SystemMetrics};
use crate::protocol::{ClientCommand, ServerEvent};
use crate::registry::{SessionHandle, SessionSummary, OBSERVER_BUFFER};
use crate::session::{SessionCommand, SessionController, SessionSettings, SessionState};
use crate::validation::{validate_session_id, validate_speak_request, validate_voice_id};
use crate::AppState;

/// Outgoing events queued per client before delivery starts failing.
const CLIENT_BUFFER: usize = 256;
/// Pending client commands per session.
const COMMAND_BUFFER: usize = 32;

pub(crate) static START_TIME: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();

pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn metrics_endpoint(State(state): State<AppState>) -> Json<MetricsResponse> {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let cpu_usage = system.global_cpu_info().cpu_usage();
    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    let system_load = {
        #[cfg(unix)]
        {
            std::fs::read_to_string("/proc/loadavg")
                .ok()
                .and_then(|loadavg| loadavg.split_whitespace().next()?.parse::<f64>().ok())
        }
        #[cfg(not(unix))]
        None
    };

    Json(MetricsResponse {
        timestamp: chrono::Utc::now(),
        system: SystemMetrics {
            cpu_usage_percent: cpu_usage,
            memory_used_mb: memory_used / 1024 / 1024,
            memory_total_mb: memory_total / 1024 / 1024,
            memory_usage_percent,
            request_count: state.metrics.http_requests.load(Ordering::Relaxed),
            uptime_seconds: uptime,
            system_load,
        },
        sessions: state.metrics.snapshot(),
    })
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.sessions.list())
}

#[derive(Deserialize)]
pub struct SpeakRequest {
    text: String,
    voice_id: Option<String>,
    session: String,
}

#[derive(Serialize)]
pub struct SpeakAccepted {
    session: Uuid,
    state: SessionState,
}

/// Inject a speak command into a live session, as if its client had sent it.
pub async fn speak_endpoint(
    State(state): State<AppState>,
    Json(req): Json<SpeakRequest>,
) -> Result<(StatusCode, Json<SpeakAccepted>), ApiError> {
    let id = validate_session_id(&req.session)?;
    validate_speak_request(&req.text, req.voice_id.as_deref())?;

    let handle = state
        .sessions
        .get(&id)
        .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))?;

    handle
        .send(SessionCommand::Speak {
            voice_id: req.voice_id,
            text: req.text,
        })
        .map_err(|e| match e {
            TrySendError::Full(_) => ApiError::SessionBusy(id.to_string()),
            TrySendError::Closed(_) => ApiError::SessionClosed(id.to_string()),
        })?;

    info!("Speak request accepted for session {}", id);
    Ok((
        StatusCode::ACCEPTED,
        Json(SpeakAccepted {
            session: id,
            state: handle.state(),
        }),
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    voice_id: Option<String>,
    avatar_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
) -> Result<Response, ApiError> {
    if let Some(voice_id) = params.voice_id.as_deref() {
        validate_voice_id(voice_id)?;
    }
    Ok(ws.on_upgrade(move |socket| {
        run_client_session(socket, state, params.voice_id, params.avatar_id)
    }))
}

/// Owns one client connection from upgrade to teardown.
async fn run_client_session(
    socket: WebSocket,
    state: AppState,
    voice_id: Option<String>,
    avatar_id: Option<String>,
) {
    let id = Uuid::new_v4();
    let (sender, receiver) = socket.split();

    let (out_tx, out_rx) = mpsc::channel(CLIENT_BUFFER);
    let (observers, _) = broadcast::channel(OBSERVER_BUFFER);
    let client: Arc<dyn EventSink> = Arc::new(ClientSink::new(out_tx));
    let sink: Arc<dyn EventSink> = if state.config.debug_observers {
        Arc::new(ObservedSink::new(client, observers.clone()))
    } else {
        client
    };

    let voice_id = voice_id.or_else(|| state.config.default_voice_id.clone());
    let (controller, status) = SessionController::new(
        id,
        voice_id,
        SessionSettings::from_config(&state.config),
        state.connector.clone(),
        sink.clone(),
        state.metrics.clone(),
    );
    let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);

    state.sessions.insert(SessionHandle::new(
        id,
        avatar_id,
        commands.clone(),
        status,
        observers,
    ));
    state.metrics.session_opened();
    info!("Client connected, session {}", id);

    let writer = tokio::spawn(write_loop(sender, out_rx));
    let mut session = tokio::spawn(controller.run(command_rx));

    tokio::select! {
        _ = read_loop(receiver, commands.clone(), sink.clone()) => {
            let _ = commands.send(SessionCommand::Disconnect).await;
            let _ = (&mut session).await;
        }
        _ = &mut session => {}
    }

    state.sessions.remove(&id);
    state.metrics.session_closed();

    // the writer ends once the last sink is gone or a close was queued
    drop(sink);
    drop(commands);
    let _ = writer.await;
    info!("Client disconnected, session {} removed", id);
}

async fn read_loop(
    mut receiver: SplitStream<WebSocket>,
    commands: mpsc::Sender<SessionCommand>,
    sink: Arc<dyn EventSink>,
) {
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientCommand>(text.as_str()) {
                Ok(command) => {
                    if commands.send(command.into()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Rejected client message: {}", e);
                    let _ = sink.deliver(&ServerEvent::error(format!("Invalid command: {e}")));
                }
            },
            Ok(Message::Binary(_)) => {
                let _ = sink.deliver(&ServerEvent::error("Binary messages are not supported"));
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Client socket error: {}", e);
                break;
            }
        }
    }
}

async fn write_loop(mut sender: SplitSink<WebSocket, Message>, mut outbound: mpsc::Receiver<Outbound>) {
    while let Some(out) = outbound.recv().await {
        match out {
            Outbound::Event(json) => {
                if let Err(e) = sender.send(Message::Text(json.into())).await {
                    warn!("Failed to send WS message: {e}");
                    break;
                }
            }
            Outbound::Close => {
                let _ = sender
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::NORMAL,
                        reason: "session ended".into(),
                    })))
                    .await;
                break;
            }
        }
    }
    let _ = sender.close().await;
}

/// Read-only copy of everything delivered to one session's client.
pub async fn observe_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session): Path<String>,
) -> Result<Response, ApiError> {
    if !state.config.debug_observers {
        return Err(ApiError::NotFound("debug observers are disabled".into()));
    }
    let id = validate_session_id(&session)?;
    let events = state
        .sessions
        .get(&id)
        .ok_or_else(|| ApiError::SessionNotFound(id.to_string()))?
        .subscribe();

    Ok(ws.on_upgrade(move |socket| forward_observed(socket, id, events)))
}

async fn forward_observed(mut socket: WebSocket, id: Uuid, mut events: broadcast::Receiver<String>) {
    info!("Observer attached to session {}", id);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(json) => {
                    if socket.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Observer of session {} skipped {} events", id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                }
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
    debug!("Observer detached from session {}", id);
}
