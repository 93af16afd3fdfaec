use thiserror::Error;

/// Failures opening an upstream stream. Anything after the handshake is
/// reported in-band as [`UpstreamEvent::Failed`](crate::UpstreamEvent::Failed).
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("TTS provider credential is not configured")]
    MissingCredential,

    #[error("Invalid provider request: {0}")]
    InvalidRequest(String),

    #[error("Provider handshake failed: {0}")]
    Handshake(String),

    #[error("Failed to send text to provider: {0}")]
    Send(String),
}
