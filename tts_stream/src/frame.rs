//! Provider frame parsing.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use tracing::debug;
use viseme_core::TimestampEvent;

/// Events demultiplexed from one upstream connection.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    Audio { bytes: Vec<u8>, format: Option<String> },
    Timestamp(TimestampEvent),
    /// Provider signalled the end of the utterance or closed normally.
    Finished,
    /// Connection broke after the handshake.
    Failed(String),
}

impl UpstreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UpstreamEvent::Finished | UpstreamEvent::Failed(_))
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ProviderFrame {
    AudioChunk {
        data: String,
        #[serde(default)]
        format: Option<String>,
    },
    Timestamp {
        t_ms: f64,
        #[serde(default)]
        phoneme: Option<String>,
        #[serde(default)]
        word: Option<String>,
        #[serde(default)]
        pitch: Option<f32>,
        #[serde(default)]
        energy: Option<f32>,
    },
    Final,
    #[serde(other)]
    Unknown,
}

/// Untyped end-of-stream marker, `{"isFinal": true}`.
#[derive(Deserialize)]
struct FinalMarker {
    #[serde(alias = "isFinal")]
    is_final: bool,
}

/// Best-effort parse of one provider text frame.
///
/// Returns `None` for anything that is not a well-formed `audio_chunk`,
/// `timestamp` or `final` frame. Never fails.
pub fn parse_frame(text: &str) -> Option<UpstreamEvent> {
    let frame: ProviderFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            if let Ok(FinalMarker { is_final: true }) = serde_json::from_str::<FinalMarker>(text) {
                return Some(UpstreamEvent::Finished);
            }
            debug!("Dropping unparseable provider frame: {e}");
            return None;
        }
    };

    match frame {
        ProviderFrame::AudioChunk { data, format } => match BASE64.decode(data.as_bytes()) {
            Ok(bytes) => Some(UpstreamEvent::Audio { bytes, format }),
            Err(e) => {
                debug!("Dropping audio chunk with invalid base64: {e}");
                None
            }
        },
        ProviderFrame::Timestamp {
            t_ms,
            phoneme,
            word,
            pitch,
            energy,
        } => {
            if !t_ms.is_finite() {
                return None;
            }
            Some(UpstreamEvent::Timestamp(TimestampEvent {
                t_ms: t_ms.max(0.0).round() as u64,
                phoneme: phoneme.filter(|p| !p.is_empty()),
                word: word.filter(|w| !w.is_empty()),
                pitch: pitch.unwrap_or(0.0),
                energy: energy.unwrap_or(0.0),
            }))
        }
        ProviderFrame::Final => Some(UpstreamEvent::Finished),
        ProviderFrame::Unknown => None,
    }
}
