use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Process is up. Does not touch the store.
pub async fn live() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}
