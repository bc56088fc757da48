// Manga routes: catalog browsing plus narration enqueue and status polling

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{MediaSummary, NarrationOptions, NarrationRequest, NarrationStatus};
use crate::narration;
use crate::services::catalog::MediaKind;
use crate::AppState;

use super::anime::SearchQuery;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/search", get(search_manga))
        .route("/trending", get(trending_manga))
        .route("/narration", post(enqueue_narration))
        .route("/narration/:request_id", get(get_narration_status))
}

async fn search_manga(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<MediaSummary>> {
    let results = state
        .catalog
        .search(&query.q, query.page.unwrap_or(1), MediaKind::Manga)
        .await;
    Json(results)
}

async fn trending_manga(State(state): State<Arc<AppState>>) -> Json<Vec<MediaSummary>> {
    Json(state.catalog.trending(MediaKind::Manga).await)
}

/// Identity is delegated to the gateway layer; the opaque user id arrives
/// in a header and only routes the completion notification.
fn requesting_user(headers: &HeaderMap) -> String {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

/// Accepts immediately; failures surface asynchronously through the
/// status record and push channel, never as a late synchronous error.
async fn enqueue_narration(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(options): Json<NarrationOptions>,
) -> (StatusCode, Json<serde_json::Value>) {
    let request = NarrationRequest {
        request_id: Uuid::new_v4(),
        user_id: requesting_user(&headers),
        options,
    };
    let request_id = request.request_id;

    tracing::info!(
        "Narration accepted: request {} for manga {} ch {}",
        request_id,
        request.options.manga_id,
        request.options.chapter_number
    );

    let pipeline = state.pipeline.clone();
    state.jobs.spawn(async move {
        if let Err(e) = pipeline.run(request).await {
            tracing::error!("Narration job {} failed: {:#}", request_id, e);
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "requestId": request_id,
            "status": "processing",
        })),
    )
}

async fn get_narration_status(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<Uuid>,
) -> Result<Json<NarrationStatus>, (StatusCode, Json<serde_json::Value>)> {
    let not_found = || {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": "Unknown narration request",
                "requestId": request_id,
            })),
        )
    };

    let cache = state.cache.as_ref().ok_or_else(not_found)?;
    narration::load_status(cache.as_ref(), request_id)
        .await
        .map(Json)
        .ok_or_else(not_found)
}
