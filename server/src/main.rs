use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing::{info, warn};
use tts_stream::WsConnector;

use server::config::ServerConfig;
use server::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting viseme orchestrator...");

    let config = ServerConfig::from_env();
    info!(
        "Server configuration loaded: port={}, rate_limit={}/min, idle_timeout={}ms, viseme_mode={:?}",
        config.port, config.rate_limit_per_minute, config.idle_timeout_ms, config.viseme_mode
    );
    info!("Speech stream endpoint: {}", config.tts_stream_url);
    if config.tts_api_key.is_none() {
        warn!("TTS_API_KEY not set, every speak request will fail until it is configured");
    }
    if config.default_voice_id.is_none() {
        warn!("DEFAULT_VOICE_ID not set, clients must name a voice");
    }
    if config.debug_observers {
        warn!("Debug observers enabled, session events can be watched without authentication");
    }

    let connector = Arc::new(WsConnector::new(config.connector_config()));
    let state = AppState::new(config.clone(), connector);
    let app = server::app(state)?;

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
