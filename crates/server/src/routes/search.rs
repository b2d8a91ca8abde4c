use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vsearch::QueryHit;

/// Multipart field carrying the query image.
pub const FILE_FIELD: &str = "file";

/// Query parameters for visual search
#[derive(Debug, Deserialize)]
pub struct VisualSearchQuery {
    /// Number of results to return; signed so that negatives can be reported
    /// as validation errors rather than parse failures.
    #[serde(default)]
    pub top_k: Option<i64>,
}

/// Visual search response
#[derive(Debug, Serialize, Deserialize)]
pub struct VisualSearchResponse {
    /// `top_k` as requested (before clamping to the catalog size)
    pub top_k: usize,
    pub total_hits: usize,
    pub hits: Vec<QueryHit>,
}

/// Find the catalog products most similar to an uploaded image.
///
/// `POST /api/v1/visual-search?top_k=5` with a multipart body holding the
/// image in a `file` field.
pub async fn visual_search(
    State(state): State<Arc<ServerState>>,
    query: Result<Query<VisualSearchQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ServerResult<Json<VisualSearchResponse>> {
    let Query(query) = query.map_err(|e| ServerError::Validation(format!("invalid query: {e}")))?;
    let top_k = resolve_top_k(query.top_k, state.config.default_top_k)?;

    let multipart = multipart.map_err(|e| {
        ServerError::Validation(format!(
            "expected a multipart/form-data body with a '{FILE_FIELD}' field: {e}"
        ))
    })?;
    let image = read_file_field(multipart, state.config.max_body_size_mb).await?;

    let search = state.search();
    let budget = state.config.embed_timeout();
    let task = tokio::task::spawn_blocking(move || search.handle_query(&image, top_k));
    let hits = match tokio::time::timeout(budget, task).await {
        Err(_) => return Err(ServerError::EmbeddingTimeout(budget.as_secs())),
        Ok(Err(join)) => return Err(ServerError::Internal(format!("search task failed: {join}"))),
        Ok(Ok(result)) => result?,
    };

    tracing::debug!(top_k, hits = hits.len(), "visual search served");
    Ok(Json(VisualSearchResponse {
        top_k,
        total_hits: hits.len(),
        hits,
    }))
}

fn resolve_top_k(requested: Option<i64>, default: usize) -> ServerResult<usize> {
    match requested {
        None => Ok(default),
        Some(k) if k < 1 => Err(ServerError::Validation(format!(
            "top_k must be at least 1, got {k}"
        ))),
        Some(k) => usize::try_from(k)
            .map_err(|_| ServerError::Validation(format!("top_k out of range: {k}"))),
    }
}

async fn read_file_field(mut multipart: Multipart, max_body_mb: usize) -> ServerResult<Vec<u8>> {
    let field_error = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge(max_body_mb)
        } else {
            ServerError::BadRequest(format!("malformed multipart body: {e}"))
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(field_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let bytes = field.bytes().await.map_err(field_error)?;
        if bytes.is_empty() {
            return Err(ServerError::Validation(format!(
                "'{FILE_FIELD}' field is empty"
            )));
        }
        return Ok(bytes.to_vec());
    }

    Err(ServerError::Validation(format!(
        "missing required multipart field '{FILE_FIELD}'"
    )))
}
