// Configuration for the server, read from the environment

use std::time::Duration;

use tts_stream::ConnectorConfig;
use viseme_core::{SmoothingParams, VisemeMode, DEFAULT_SIMPLE_DURATION_MS};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub rate_limit_per_minute: u32,
    pub request_timeout_secs: u64,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub idle_timeout_ms: u64,
    pub tts_stream_url: String,
    pub tts_api_key: Option<String>,
    pub tts_auth_header: String,
    pub tts_audio_format: String,
    pub default_voice_id: Option<String>,
    pub viseme_mode: VisemeMode,
    pub viseme_omega: f32,
    pub simple_viseme_duration_ms: u64,
    pub debug_observers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8085,
            rate_limit_per_minute: 60,
            request_timeout_secs: 60,
            cors_allowed_origins: None,
            idle_timeout_ms: 15_000,
            tts_stream_url: "wss://api.elevenlabs.io/v1/text-to-speech/stream".to_string(),
            tts_api_key: None,
            tts_auth_header: "xi-api-key".to_string(),
            tts_audio_format: "mp3".to_string(),
            default_voice_id: None,
            viseme_mode: VisemeMode::Weighted,
            viseme_omega: SmoothingParams::default().omega_n,
            simple_viseme_duration_ms: DEFAULT_SIMPLE_DURATION_MS,
            debug_observers: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect()
            });

        let viseme_mode = match env_string("VISEME_MODE") {
            Some(raw) => VisemeMode::parse(&raw).unwrap_or_else(|| {
                tracing::warn!("Unknown VISEME_MODE '{raw}', using weighted");
                VisemeMode::Weighted
            }),
            None => defaults.viseme_mode,
        };

        let debug_observers = env_string("DEBUG_OBSERVERS")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(defaults.debug_observers);

        Self {
            port: env_parse("PORT").unwrap_or(defaults.port),
            rate_limit_per_minute: env_parse("RATE_LIMIT_PER_MINUTE")
                .unwrap_or(defaults.rate_limit_per_minute),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS")
                .unwrap_or(defaults.request_timeout_secs),
            cors_allowed_origins,
            idle_timeout_ms: env_parse("IDLE_TIMEOUT_MS").unwrap_or(defaults.idle_timeout_ms),
            tts_stream_url: env_string("TTS_STREAM_URL").unwrap_or(defaults.tts_stream_url),
            tts_api_key: env_string("TTS_API_KEY"),
            tts_auth_header: env_string("TTS_AUTH_HEADER").unwrap_or(defaults.tts_auth_header),
            tts_audio_format: env_string("TTS_AUDIO_FORMAT").unwrap_or(defaults.tts_audio_format),
            default_voice_id: env_string("DEFAULT_VOICE_ID"),
            viseme_mode,
            viseme_omega: env_parse("VISEME_OMEGA")
                .filter(|w: &f32| w.is_finite() && *w > 0.0)
                .unwrap_or(defaults.viseme_omega),
            simple_viseme_duration_ms: env_parse("SIMPLE_VISEME_DURATION_MS")
                .unwrap_or(defaults.simple_viseme_duration_ms),
            debug_observers,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig {
            endpoint: self.tts_stream_url.clone(),
            api_key: self.tts_api_key.clone(),
            auth_header: self.tts_auth_header.clone(),
        }
    }
}
