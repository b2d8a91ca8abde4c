use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Catalog statistics
#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogStats {
    pub size: usize,
    pub dimension: usize,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub max_layer: usize,
    pub model: String,
    pub catalog_prefix: String,
    pub loaded_at: String,
}

fn stats(state: &ServerState) -> CatalogStats {
    let search = state.search();
    let index = search.index();
    let config = index.config();
    CatalogStats {
        size: search.len(),
        dimension: index.dimension(),
        m: config.m,
        ef_construction: config.ef_construction,
        ef_search: config.ef_search,
        max_layer: index.max_layer(),
        model: search.embedder().model_name().to_string(),
        catalog_prefix: state.config.catalog_prefix.clone(),
        loaded_at: state.loaded_at().to_rfc3339(),
    }
}

/// Get statistics for the catalog currently being served
pub async fn catalog_stats(State(state): State<Arc<ServerState>>) -> Json<CatalogStats> {
    Json(stats(&state))
}

/// Reload response
#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub status: String,
    pub previous_size: usize,
    pub stats: CatalogStats,
}

/// Re-read the artifact pair from disk and swap it in
pub async fn reload_catalog(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<Json<ReloadResponse>> {
    let previous_size = state.search().len();

    let task_state = state.clone();
    tokio::task::spawn_blocking(move || task_state.reload())
        .await
        .map_err(|e| ServerError::Internal(format!("reload task failed: {e}")))??;

    Ok(Json(ReloadResponse {
        status: "reloaded".to_string(),
        previous_size,
        stats: stats(&state),
    }))
}
