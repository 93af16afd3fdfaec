pub mod config;
pub mod delivery;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod registry;
pub mod routes;
pub mod session;
pub mod validation;
pub mod watchdog;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_governor::{governor::GovernorConfigBuilder, key_extractor::GlobalKeyExtractor, GovernorLayer};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tts_stream::StreamConnector;

use crate::config::ServerConfig;
use crate::metrics::OrchestratorMetrics;
use crate::registry::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub connector: Arc<dyn StreamConnector>,
    pub sessions: SessionRegistry,
    pub metrics: Arc<OrchestratorMetrics>,
}

impl AppState {
    pub fn new(config: ServerConfig, connector: Arc<dyn StreamConnector>) -> Self {
        Self {
            config,
            connector,
            sessions: SessionRegistry::new(),
            metrics: Arc::new(OrchestratorMetrics::new()),
        }
    }
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let permissive = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(methods.clone())
        .allow_headers(Any)
        .allow_credentials(false);

    let Some(allowed_origins) = config.cors_allowed_origins.as_ref() else {
        warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (development mode)");
        return permissive;
    };

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    if origins.is_empty() {
        warn!("CORS_ALLOWED_ORIGINS is empty, falling back to permissive CORS");
        return permissive;
    }

    info!("CORS configured for {} origin(s)", origins.len());
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(methods)
        .allow_headers(Any)
        .allow_credentials(false)
}

// Request ID middleware for tracing
async fn add_request_id(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    state.metrics.http_requests.fetch_add(1, Ordering::Relaxed);

    let request_id = HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()).ok();
    if let Some(id) = request_id.clone() {
        request.headers_mut().insert("x-request-id", id);
    }
    let mut response = next.run(request).await;
    if let Some(id) = request_id {
        response.headers_mut().insert("x-request-id", id);
    }
    response
}

/// Build the full application router.
pub fn app(state: AppState) -> anyhow::Result<Router> {
    let _ = routes::START_TIME.get_or_init(std::time::Instant::now);
    let config = &state.config;

    // Global limit shared by all clients; works behind proxies where the
    // peer address is not the caller's.
    let per_minute = config.rate_limit_per_minute.max(1);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(60_000 / u64::from(per_minute))
            .burst_size(per_minute)
            .key_extractor(GlobalKeyExtractor)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?,
    );
    info!("Rate limiting: {} requests per minute", per_minute);

    let middleware_stack = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer::new(governor_conf))
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(cors_layer(config))
        .into_inner();

    let public_api = Router::new()
        .route("/health", get(routes::health_check))
        .route("/healthz", get(routes::health_check))
        .route("/ws", get(routes::ws_handler))
        .route("/speak", post(routes::speak_endpoint))
        .route("/sessions", get(routes::list_sessions))
        .route("/debug/sessions/{id}/events", get(routes::observe_ws));

    // Metrics endpoint - consider adding authentication in production
    let metrics_api = Router::new().route("/metrics", get(routes::metrics_endpoint));

    let api = Router::new().merge(public_api).merge(metrics_api);

    Ok(Router::new()
        .merge(api.clone()) // root paths
        .nest("/api", api) // /api prefix
        .layer(axum::middleware::from_fn_with_state(state.clone(), add_request_id))
        .layer(middleware_stack)
        .with_state(state))
}
