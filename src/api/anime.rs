// Anime routes: catalog browsing plus the episode-stream endpoint

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::{MediaSummary, StreamResult};
use crate::services::catalog::MediaKind;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/search", get(search_anime))
        .route("/top", get(top_anime))
        .route("/seasonal", get(seasonal_anime))
        .route("/:anime_id/episodes/:episode_id/stream", get(get_stream))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    pub page: Option<u32>,
}

async fn search_anime(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<MediaSummary>> {
    let results = state
        .catalog
        .search(&query.q, query.page.unwrap_or(1), MediaKind::Anime)
        .await;
    Json(results)
}

async fn top_anime(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MediaSummary>>, (StatusCode, String)> {
    state
        .jikan
        .top_anime()
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn seasonal_anime(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<MediaSummary>>, (StatusCode, String)> {
    state
        .jikan
        .seasonal_anime()
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

/// Always returns something renderable (stream, embed, or fallback links);
/// only total resolution failure surfaces a diagnostic 404.
async fn get_stream(
    State(state): State<Arc<AppState>>,
    Path((anime_id, episode_id)): Path<(String, String)>,
) -> Result<Json<StreamResult>, (StatusCode, Json<serde_json::Value>)> {
    match state.resolver.resolve(&anime_id, &episode_id).await {
        Ok(result) => Ok(Json(result)),
        Err(failure) => {
            tracing::warn!(
                "Stream resolution failed for {}/{}: {}",
                anime_id,
                episode_id,
                failure.message
            );
            Err((
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({
                    "error": failure.message,
                    "details": failure.diagnostics,
                })),
            ))
        }
    }
}
