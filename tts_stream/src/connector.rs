//! WebSocket connection to the streaming TTS provider.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, Request};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::StreamError;
use crate::frame::{parse_frame, UpstreamEvent};
use crate::stream::{UpstreamStream, EVENT_BUFFER};

type ProviderSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Marks the end of the text input for the provider.
const END_OF_INPUT_JSON: &str = r#"{"text":""}"#;
/// Time allowed for a graceful close before the socket is dropped.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Opens upstream speech streams.
///
/// Implementations only open connections; keeping a single live stream per
/// session is the caller's job.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn start_stream(
        &self,
        voice_id: &str,
        text: Option<&str>,
    ) -> Result<UpstreamStream, StreamError>;
}

#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Provider streaming endpoint, e.g. `wss://tts.example.com/v1/stream`.
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Header carrying the credential.
    pub auth_header: String,
}

pub struct WsConnector {
    config: ConnectorConfig,
}

impl WsConnector {
    pub fn new(config: ConnectorConfig) -> Self {
        // rustls needs a process-wide crypto provider before the first wss:// connect
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
        Self { config }
    }

    fn build_request(&self, voice_id: &str, api_key: &str) -> Result<Request<()>, StreamError> {
        let separator = if self.config.endpoint.contains('?') { '&' } else { '?' };
        let url = format!(
            "{}{}voice_id={}",
            self.config.endpoint,
            separator,
            urlencoding::encode(voice_id)
        );

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| StreamError::InvalidRequest(format!("bad endpoint {url}: {e}")))?;

        let name = HeaderName::from_bytes(self.config.auth_header.as_bytes())
            .map_err(|e| StreamError::InvalidRequest(format!("bad auth header name: {e}")))?;
        let mut value = HeaderValue::from_str(api_key)
            .map_err(|_| StreamError::InvalidRequest("credential is not a valid header value".into()))?;
        value.set_sensitive(true);
        request.headers_mut().insert(name, value);

        Ok(request)
    }
}

#[async_trait]
impl StreamConnector for WsConnector {
    async fn start_stream(
        &self,
        voice_id: &str,
        text: Option<&str>,
    ) -> Result<UpstreamStream, StreamError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(StreamError::MissingCredential)?;

        let request = self.build_request(voice_id, api_key)?;
        let started = Instant::now();
        let (mut socket, _response) = connect_async(request)
            .await
            .map_err(|e| StreamError::Handshake(e.to_string()))?;
        info!(
            "Upstream stream open for voice {voice_id} in {}ms",
            started.elapsed().as_millis()
        );

        if let Some(text) = text {
            let payload = serde_json::json!({ "text": text }).to_string();
            socket
                .send(Message::Text(payload.into()))
                .await
                .map_err(|e| StreamError::Send(e.to_string()))?;
            socket
                .send(Message::Text(END_OF_INPUT_JSON.into()))
                .await
                .map_err(|e| StreamError::Send(e.to_string()))?;
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        tokio::spawn(read_frames(socket, tx, shutdown_rx));

        Ok(UpstreamStream::new(rx, shutdown_tx))
    }
}

/// Pump provider frames into the event queue until the owner closes the
/// stream, the provider finishes, or the connection breaks.
async fn read_frames(
    mut socket: ProviderSocket,
    events: mpsc::Sender<UpstreamEvent>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = &mut shutdown => {
                debug!("Upstream stream closed by owner");
                let _ = tokio::time::timeout(CLOSE_GRACE, socket.close(None)).await;
                return;
            }
            message = socket.next() => message,
        };

        let event = match message {
            Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                Some(event) => event,
                None => continue,
            },
            Some(Ok(Message::Binary(bytes))) => {
                match std::str::from_utf8(&bytes).ok().and_then(parse_frame) {
                    Some(event) => event,
                    None => continue,
                }
            }
            Some(Ok(Message::Close(frame))) => match frame {
                Some(frame) if frame.code != CloseCode::Normal => UpstreamEvent::Failed(format!(
                    "provider closed with code {}: {}",
                    u16::from(frame.code),
                    frame.reason.as_str()
                )),
                _ => UpstreamEvent::Finished,
            },
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                warn!("Upstream connection error: {e}");
                UpstreamEvent::Failed(e.to_string())
            }
            None => UpstreamEvent::Finished,
        };

        let terminal = event.is_terminal();
        if events.send(event).await.is_err() {
            // owner went away
            return;
        }
        if terminal {
            let _ = tokio::time::timeout(CLOSE_GRACE, socket.close(None)).await;
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector(api_key: Option<&str>) -> WsConnector {
        WsConnector::new(ConnectorConfig {
            endpoint: "ws://127.0.0.1:9/v1/stream".into(),
            api_key: api_key.map(str::to_string),
            auth_header: "xi-api-key".into(),
        })
    }

    #[test]
    fn test_build_request() {
        let request = connector(Some("secret")).build_request("v1", "secret").unwrap();
        assert_eq!(request.uri().to_string(), "ws://127.0.0.1:9/v1/stream?voice_id=v1");
        assert_eq!(request.headers()["xi-api-key"], "secret");
    }

    #[test]
    fn test_build_request_appends_to_existing_query() {
        let mut c = connector(Some("k"));
        c.config.endpoint = "ws://localhost/stream?model=fast".into();
        let request = c.build_request("a b", "k").unwrap();
        assert_eq!(
            request.uri().to_string(),
            "ws://localhost/stream?model=fast&voice_id=a%20b"
        );
    }

    #[test]
    fn test_build_request_rejects_bad_endpoint() {
        let mut c = connector(Some("k"));
        c.config.endpoint = "not a url".into();
        assert!(matches!(
            c.build_request("v1", "k"),
            Err(StreamError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_credential_fails_fast() {
        for key in [None, Some(""), Some("   ")] {
            let result = connector(key).start_stream("v1", Some("hi")).await;
            assert!(matches!(result, Err(StreamError::MissingCredential)));
        }
    }
}
