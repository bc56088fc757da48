use axum::extract::State;
use axum::{routing::get, Json, Router};
use std::sync::Arc;

use crate::AppState;

mod anime;
mod manga;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/system/info", get(system_info))
        .nest("/anime", anime::routes())
        .nest("/manga", manga::routes())
}

async fn system_info(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "streamingProvider": state.config.providers.consumet_base_url,
        "ttsConfigured": state.config.providers.elevenlabs_api_key.is_some(),
        "objectStorageConfigured": state.config.providers.cloudinary_cloud_name.is_some(),
    }))
}
