//! HTTP proxy server

pub mod http;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::agent::llm::{BackendClient, ChatBackend};
use crate::agent::tool_loop::Orchestrator;
use crate::agent::tools::ToolContext;
use crate::config::Config;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub backend: Arc<dyn ChatBackend>,
    pub orchestrator: Orchestrator,
}

impl ServerState {
    pub fn new(config: Config, backend: Arc<dyn ChatBackend>) -> Self {
        let tools = ToolContext::from_config(&config);
        Self {
            orchestrator: Orchestrator::new(backend.clone(), tools),
            backend,
            config: Arc::new(config),
        }
    }

    /// State backed by the real HTTP client
    pub fn from_config(config: Config) -> Result<Self> {
        let backend = BackendClient::from_config(&config.model)
            .context("Failed to create backend HTTP client")?;
        Ok(Self::new(config, Arc::new(backend)))
    }
}

/// Build the router
pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/chat/completions", post(http::chat_completions_handler))
        .route("/v1/models", get(http::list_models_handler))
        .route("/health", get(http::health_handler))
        .fallback(http::passthrough_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the proxy server
pub async fn start(config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server host/port")?;

    let state = ServerState::from_config(config)?;
    let flags = state.orchestrator.tools().flags();
    info!(
        endpoint = %state.config.model.endpoint,
        file_operations = flags.file_operations,
        terminal = flags.terminal,
        edit_operations = flags.edit_operations,
        auto_apply_edits = state.config.tools.auto_apply_edits,
        "Tool proxy configured"
    );

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(%addr, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
