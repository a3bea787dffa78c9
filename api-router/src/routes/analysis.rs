use analysis_queue::{CancelOutcome, JobStatusView, QueueReceipt};
use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

pub async fn submit_analysis(
    State(state): State<ApiState>,
    Json(body): Json<Value>,
) -> Result<Json<QueueReceipt>, ApiError> {
    let receipt = state.manager.queue_analysis(body).await?;

    info!(
        job_id = %receipt.job_id,
        priority = receipt.priority,
        queue_position = receipt.queue_position,
        "Accepted analysis request"
    );

    Ok(Json(receipt))
}

pub async fn get_analysis(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusView>, ApiError> {
    Ok(Json(state.manager.get_job_status(&job_id).await?))
}

pub async fn cancel_analysis(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<CancelOutcome>, ApiError> {
    Ok(Json(state.manager.cancel_job(&job_id).await?))
}

pub async fn retry_analysis(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusView>, ApiError> {
    Ok(Json(state.manager.retry_job(&job_id).await?))
}
