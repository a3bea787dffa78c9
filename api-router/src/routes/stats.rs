use analysis_queue::QueueStats;
use axum::{extract::State, Json};

use crate::api_state::ApiState;

/// Always 200; an unreachable store is reported in the body.
pub async fn queue_stats(State(state): State<ApiState>) -> Json<QueueStats> {
    Json(state.manager.get_queue_stats().await)
}
