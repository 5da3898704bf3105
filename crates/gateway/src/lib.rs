//! HTTP gateway for FaceAgent.
//!
//! Routes:
//! - `GET /health`: liveness probe, no auth
//! - `POST /chat`: bearer-authenticated chat turn, answered as SSE

pub mod auth;
pub mod chat;
pub mod error;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use faceagent_agent::AgentLoop;
use faceagent_config::AppConfig;
use faceagent_core::{ChatStore, Provider, Tool};
use faceagent_providers::OpenAiCompatProvider;
use faceagent_tools::GenerateTool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use auth::{AuthUser, JwtVerifier};
pub use chat::ChatRequest;
pub use error::ApiError;

/// Everything a request handler needs, shared across requests.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub agent: AgentLoop,
    pub auth: JwtVerifier,
    pub history_limit: usize,
}

impl AppState {
    pub fn new(config: &AppConfig, store: Arc<dyn ChatStore>, agent: AgentLoop, auth: JwtVerifier) -> Self {
        Self {
            store,
            agent,
            auth,
            history_limit: config.database.history_limit,
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build the router.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let protected = Router::new()
        .route("/chat", post(chat::chat_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware))
        .with_state(state);

    Router::new()
        .route("/health", get(health_handler))
        .merge(protected)
        .layer(cors_layer(cors_origins))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(TraceLayer::new_for_http())
}

/// Wire up the store, model provider and tool from config, then serve.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    config.ensure_servable()?;

    let store = faceagent_store::open(&config.database).await?;
    let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::from_config(&config)?);
    let tool: Arc<dyn Tool> = Arc::new(GenerateTool::from_config(&config, provider.clone())?);
    let agent = AgentLoop::from_config(&config, provider, tool);
    let auth = JwtVerifier::from_config(&config.auth)?;

    let state = AppState::new(&config, store.clone(), agent, auth);
    let app = build_router(state, &config.gateway.cors_origins);

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    info!(
        address = %addr,
        model = %config.model,
        store = store.name(),
        webhook_configured = config.webhook.url.is_some(),
        "Starting FaceAgent gateway"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
