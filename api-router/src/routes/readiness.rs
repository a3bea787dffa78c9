use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api_state::ApiState;

/// Readiness probe: 200 once the job store answers queries, else 503.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    if let Err(e) = state.db.client.query("RETURN true").await {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "db": "fail" },
                "reason": e.to_string()
            })),
        );
    }

    match state.manager.queue().size().await {
        Ok(queue_depth) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "db": "ok", "queue": "ok" },
                "queue_depth": queue_depth
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "db": "ok", "queue": "fail" },
                "reason": e.to_string()
            })),
        ),
    }
}
