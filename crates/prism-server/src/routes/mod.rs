//! HTTP routes

mod cache;
mod generate;
mod status;

pub use generate::GenerateBody;

use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::state::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/generate/stream",
            post(generate::stream_json).get(generate::stream_query),
        )
        .route(
            "/api/cache/image/{key}",
            get(cache::get_image).delete(cache::delete_image),
        )
        .route("/api/cache/info/{key}", get(cache::image_info))
        .route("/api/cache/table/{key}", get(cache::get_table))
        .route("/api/cache/cleanup", post(cache::cleanup))
        .route("/api/status", get(status::status))
        .route("/api/health", get(status::health))
        .fallback(fallback)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn fallback(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Not found", "path": uri.path() })),
    )
}
