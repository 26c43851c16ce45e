use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::error::{GatewayError, GatewayResult};
use crate::proxy::config::GatewayConfig;
use crate::proxy::credential::CredentialPool;
use crate::proxy::handlers;
use crate::proxy::upstream::UpstreamClient;
use crate::proxy::usage::UsageStats;

/// Shared handles injected into every request handler. The pool and the
/// counters are the only process-wide mutable state.
#[derive(Clone)]
pub struct AppState {
    pub pool: Arc<CredentialPool>,
    pub usage: Arc<UsageStats>,
    pub upstream: Arc<UpstreamClient>,
}

impl AppState {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            pool: Arc::new(CredentialPool::new(
                config.credential_count,
                config.refresh_url(),
            )),
            usage: Arc::new(UsageStats::new()),
            upstream: Arc::new(UpstreamClient::new(config.upstream_url.clone())),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/chat/completions",
            post(handlers::openai::handle_chat_completions),
        )
        .route("/v1/models", get(handlers::openai::handle_list_models))
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_check_handler))
        .with_state(state)
}

pub async fn serve(config: GatewayConfig) -> GatewayResult<()> {
    let state = AppState::new(&config);
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GatewayError::Config(format!("Address {} binding failed: {}", addr, e)))?;

    info!("Gateway listening at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

async fn health_check_handler() -> Response {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
    .into_response()
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    Json(json!({
        "tokens": state.usage.summary(),
        "credentials": state.pool.stats().await,
    }))
    .into_response()
}
