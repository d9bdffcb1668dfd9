//! Admin API: health, metrics, topology reload triggers and cached metadata.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use shard_proxy::{ProxyApi, ProxyError, ReloadOutcome, ReloadStatus, ShardProxyService};
use tracing::info;

/// Build the admin router.
pub fn admin_router(service: Arc<ShardProxyService>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/admin/reload-observers", post(reload_observers))
        .route(
            "/admin/reload-full-history-observers",
            post(reload_full_history_observers),
        )
        .route("/network/economics", get(economics))
        .with_state(service)
}

async fn health_check(State(service): State<Arc<ShardProxyService>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "shard-proxy",
        "version": env!("CARGO_PKG_VERSION"),
        "topology_generation": service.registry().generation(),
        "out_of_sync_observers": service.registry().out_of_sync(),
    }))
}

async fn metrics(State(service): State<Arc<ShardProxyService>>) -> impl IntoResponse {
    Json(service.metrics().to_json())
}

async fn reload_observers(State(service): State<Arc<ShardProxyService>>) -> impl IntoResponse {
    info!("Observer reload requested");
    reload_response(service.reload_observers().await)
}

async fn reload_full_history_observers(
    State(service): State<Arc<ShardProxyService>>,
) -> impl IntoResponse {
    info!("Full-history observer reload requested");
    reload_response(service.reload_full_history_observers().await)
}

fn reload_response(outcome: ReloadOutcome) -> (StatusCode, Json<ReloadOutcome>) {
    let status = match outcome.status {
        ReloadStatus::Reloaded => StatusCode::OK,
        ReloadStatus::Rejected => StatusCode::BAD_REQUEST,
        ReloadStatus::Failed => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(outcome))
}

async fn economics(State(service): State<Arc<ShardProxyService>>) -> impl IntoResponse {
    match service.economics().await {
        Ok(data) => (
            StatusCode::OK,
            Json(json!({ "data": data, "error": "", "code": "successful" })),
        ),
        Err(err) => error_response(&err),
    }
}

/// Observer-style error envelope with the status the error maps to.
pub fn error_response(err: &ProxyError) -> (StatusCode, Json<serde_json::Value>) {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let code = if status.is_client_error() {
        "bad_request"
    } else {
        "internal_issue"
    };
    (
        status,
        Json(json!({ "data": null, "error": err.to_string(), "code": code })),
    )
}
