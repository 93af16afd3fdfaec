//! Client-facing wire messages.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use viseme_core::{SimpleViseme, VisemeFrame};

/// Commands sent by the rendering client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Speak {
        #[serde(default)]
        voice_id: Option<String>,
        text: String,
    },
    Stop,
}

/// Events delivered to the rendering client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Audio { data: String, format: String },
    Viseme(VisemePayload),
    Done,
    Error { message: String },
}

/// Weighted frames are canonical; the single-category form is the degraded
/// fallback for renderers that cannot blend.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VisemePayload {
    Weighted(VisemeFrame),
    Simple(SimpleViseme),
}

impl ServerEvent {
    pub fn audio(bytes: &[u8], format: impl Into<String>) -> Self {
        ServerEvent::Audio {
            data: BASE64.encode(bytes),
            format: format.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Audio { .. } => "audio",
            ServerEvent::Viseme(_) => "viseme",
            ServerEvent::Done => "done",
            ServerEvent::Error { .. } => "error",
        }
    }
}
