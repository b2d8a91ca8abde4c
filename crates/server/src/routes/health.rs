use crate::state::{ServerMetadata, ServerState};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use std::time::SystemTime;

/// Global server start time for uptime calculation
static SERVER_START_TIME: once_cell::sync::Lazy<SystemTime> =
    once_cell::sync::Lazy::new(SystemTime::now);

fn uptime_seconds() -> u64 {
    SERVER_START_TIME
        .elapsed()
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Health check endpoint (liveness)
/// Returns 200 if server is running
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "vsearch-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
    }))
}

/// Readiness check endpoint
///
/// The state only exists once a catalog is loaded, so this reports what is
/// being served rather than gating on it.
pub async fn readiness_check(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let search = state.search();
    let catalog_status = if search.is_empty() { "empty" } else { "ready" };

    Json(json!({
        "status": "ready",
        "service": "vsearch-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds(),
        "components": {
            "api": "ready",
            "catalog": catalog_status,
            "embedder": search.embedder().model_name(),
        },
        "catalog_size": search.len(),
        "catalog_loaded_at": state.loaded_at().to_rfc3339(),
    }))
}

/// Prometheus metrics endpoint
///
/// Falls back to a JSON uptime document when no recorder is installed.
pub async fn metrics(State(state): State<Arc<ServerState>>) -> Response {
    match state.prometheus() {
        Some(handle) if state.config.metrics_enabled => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        _ => Json(ServerMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime_seconds(),
        })
        .into_response(),
    }
}
