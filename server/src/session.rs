//! Per-client session controller.
//!
//! One task per connected client owns the viseme mapper, the upstream stream
//! handle and the idle watchdog. Client commands, upstream events and the
//! watchdog are multiplexed in a single `select!` loop, so none of that state
//! is ever touched from two places at once.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use tts_stream::{StreamConnector, UpstreamEvent, UpstreamStream};
use uuid::Uuid;
use viseme_core::{simple_viseme, SmoothingParams, TimestampEvent, VisemeMapper, VisemeMode};

use crate::config::ServerConfig;
use crate::delivery::EventSink;
use crate::metrics::OrchestratorMetrics;
use crate::protocol::{ClientCommand, ServerEvent, VisemePayload};
use crate::validation::validate_speak_request;
use crate::watchdog::IdleWatchdog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Speaking,
    Closing,
    Closed,
}

/// Published view of a running session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub voice_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Speak {
        voice_id: Option<String>,
        text: String,
    },
    Stop,
    /// The client connection went away.
    Disconnect,
}

impl From<ClientCommand> for SessionCommand {
    fn from(command: ClientCommand) -> Self {
        match command {
            ClientCommand::Speak { voice_id, text } => SessionCommand::Speak { voice_id, text },
            ClientCommand::Stop => SessionCommand::Stop,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub idle_timeout: Duration,
    pub audio_format: String,
    pub viseme_mode: VisemeMode,
    pub smoothing: SmoothingParams,
    pub simple_duration_ms: u64,
}

impl SessionSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            audio_format: config.tts_audio_format.clone(),
            viseme_mode: config.viseme_mode,
            smoothing: SmoothingParams::with_omega(config.viseme_omega),
            simple_duration_ms: config.simple_viseme_duration_ms,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

enum Flow {
    Continue,
    Terminate,
}

pub struct SessionController {
    id: Uuid,
    voice_id: Option<String>,
    settings: SessionSettings,
    connector: Arc<dyn StreamConnector>,
    sink: Arc<dyn EventSink>,
    metrics: Arc<OrchestratorMetrics>,
    mapper: VisemeMapper,
    watchdog: IdleWatchdog,
    upstream: Option<UpstreamStream>,
    status: watch::Sender<SessionStatus>,
}

impl SessionController {
    pub fn new(
        id: Uuid,
        voice_id: Option<String>,
        settings: SessionSettings,
        connector: Arc<dyn StreamConnector>,
        sink: Arc<dyn EventSink>,
        metrics: Arc<OrchestratorMetrics>,
    ) -> (Self, watch::Receiver<SessionStatus>) {
        let (status, status_rx) = watch::channel(SessionStatus {
            state: SessionState::Idle,
            voice_id: voice_id.clone(),
        });
        let controller = Self {
            id,
            voice_id,
            mapper: VisemeMapper::new(settings.smoothing),
            watchdog: IdleWatchdog::new(settings.idle_timeout),
            settings,
            connector,
            sink,
            metrics,
            upstream: None,
            status,
        };
        (controller, status_rx)
    }

    /// Drive the session until stop, idle timeout or disconnect.
    pub async fn run(mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        info!("Session {} started", self.id);

        loop {
            // commands first: a stop or barge-in discards upstream events already queued
            let flow = tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => self.disconnect(),
                },
                event = next_upstream(&mut self.upstream) => self.handle_upstream(event),
                _ = self.watchdog.expired() => self.idle_timeout(),
            };
            if let Flow::Terminate = flow {
                break;
            }
        }

        self.close_upstream();
        self.set_state(SessionState::Closed);
        info!("Session {} closed", self.id);
    }

    async fn handle_command(&mut self, command: SessionCommand) -> Flow {
        match command {
            SessionCommand::Speak { voice_id, text } => self.speak(voice_id, text).await,
            SessionCommand::Stop => self.stop(),
            SessionCommand::Disconnect => self.disconnect(),
        }
    }

    async fn speak(&mut self, voice_id: Option<String>, text: String) -> Flow {
        self.metrics.speak_requests.fetch_add(1, Ordering::Relaxed);

        let Some(voice_id) = voice_id.or_else(|| self.voice_id.clone()) else {
            self.deliver(ServerEvent::error(
                "No voice_id given and no default voice configured",
            ));
            return Flow::Continue;
        };
        if let Err(e) = validate_speak_request(&text, Some(&voice_id)) {
            self.deliver(ServerEvent::error(e.to_string()));
            return Flow::Continue;
        }
        // a valid request is activity; the handshake gets a full idle period
        self.watchdog.reset();

        // barge-in: the previous stream is gone before the next one opens
        if let Some(previous) = self.upstream.take() {
            info!("Session {}: barge-in, cancelling current speech", self.id);
            self.metrics.barge_ins.fetch_add(1, Ordering::Relaxed);
            previous.close();
            self.set_state(SessionState::Idle);
        }

        let started = Instant::now();
        let opened = tokio::select! {
            result = self.connector.start_stream(&voice_id, Some(&text)) => result,
            _ = self.watchdog.expired() => return self.idle_timeout(),
        };

        match opened {
            Ok(stream) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                self.metrics.handshake.record(latency_ms);
                debug!("Session {}: upstream open in {}ms", self.id, latency_ms);
                self.upstream = Some(stream);
                self.voice_id = Some(voice_id);
                self.watchdog.reset();
                self.set_state(SessionState::Speaking);
            }
            Err(e) => {
                warn!("Session {}: failed to start speech: {}", self.id, e);
                self.metrics.upstream_failures.fetch_add(1, Ordering::Relaxed);
                self.deliver(ServerEvent::error(format!("Failed to start speech: {e}")));
                self.set_state(SessionState::Idle);
            }
        }
        Flow::Continue
    }

    fn stop(&mut self) -> Flow {
        info!("Session {}: stop requested", self.id);
        self.close_upstream();
        self.deliver(ServerEvent::Done);
        self.set_state(SessionState::Closing);
        self.sink.close();
        Flow::Terminate
    }

    fn idle_timeout(&mut self) -> Flow {
        info!(
            "Session {}: idle for {}ms, closing",
            self.id,
            self.watchdog.timeout().as_millis()
        );
        self.metrics.idle_timeouts.fetch_add(1, Ordering::Relaxed);
        self.deliver(ServerEvent::Done);
        self.close_upstream();
        self.set_state(SessionState::Closing);
        self.sink.close();
        Flow::Terminate
    }

    fn disconnect(&mut self) -> Flow {
        info!("Session {}: client disconnected", self.id);
        self.close_upstream();
        Flow::Terminate
    }

    fn handle_upstream(&mut self, event: Option<UpstreamEvent>) -> Flow {
        match event {
            Some(UpstreamEvent::Audio { bytes, format }) => {
                let format = format.unwrap_or_else(|| self.settings.audio_format.clone());
                self.forward(ServerEvent::audio(&bytes, format));
                self.metrics
                    .audio_chunks_forwarded
                    .fetch_add(1, Ordering::Relaxed);
            }
            Some(UpstreamEvent::Timestamp(event)) => {
                if let Some(payload) = self.map_viseme(&event) {
                    self.forward(ServerEvent::Viseme(payload));
                    self.metrics.visemes_forwarded.fetch_add(1, Ordering::Relaxed);
                }
            }
            Some(UpstreamEvent::Failed(reason)) => {
                warn!("Session {}: speech stream failed: {}", self.id, reason);
                self.metrics.upstream_failures.fetch_add(1, Ordering::Relaxed);
                self.upstream = None;
                self.deliver(ServerEvent::error(format!("Speech stream failed: {reason}")));
                self.set_state(SessionState::Idle);
            }
            Some(UpstreamEvent::Finished) | None => {
                debug!("Session {}: turn complete", self.id);
                self.upstream = None;
                self.set_state(SessionState::Idle);
            }
        }
        Flow::Continue
    }

    fn map_viseme(&mut self, event: &TimestampEvent) -> Option<VisemePayload> {
        match self.settings.viseme_mode {
            VisemeMode::Weighted => self.mapper.process(event).map(VisemePayload::Weighted),
            VisemeMode::Simple => {
                simple_viseme(event, self.settings.simple_duration_ms).map(VisemePayload::Simple)
            }
        }
    }

    /// Deliver a speech event and rearm the watchdog.
    fn forward(&mut self, event: ServerEvent) {
        self.deliver(event);
        self.watchdog.reset();
    }

    fn deliver(&self, event: ServerEvent) {
        if let Err(e) = self.sink.deliver(&event) {
            self.metrics.delivery_failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Session {}: failed to deliver {} event: {}",
                self.id,
                event.kind(),
                e
            );
        }
    }

    fn close_upstream(&mut self) {
        if let Some(stream) = self.upstream.take() {
            stream.close();
        }
    }

    fn set_state(&self, state: SessionState) {
        let voice_id = self.voice_id.clone();
        self.status.send_modify(|status| {
            status.state = state;
            status.voice_id = voice_id;
        });
    }
}

async fn next_upstream(upstream: &mut Option<UpstreamStream>) -> Option<UpstreamEvent> {
    match upstream {
        Some(stream) => stream.next_event().await,
        None => std::future::pending().await,
    }
}
