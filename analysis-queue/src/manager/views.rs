use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::storage::types::analysis_job::{AnalysisJob, JobStatus};
use serde::Serialize;
use serde_json::Value;

/// Returned to the caller on submission.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueueReceipt {
    pub job_id: String,
    pub status: JobStatus,
    pub priority: i32,
    pub estimated_wait_time: u64,
    pub queue_position: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobStatusView {
    pub job_id: String,
    pub job_type: String,
    pub status: JobStatus,
    pub priority: i32,
    pub attempts: u32,
    pub estimated_duration_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatusView {
    /// Status fields of `job`; queue placement is filled in by the manager.
    pub fn from_job(job: &AnalysisJob) -> Self {
        Self {
            job_id: job.id.clone(),
            job_type: job.job_type.clone(),
            status: job.status,
            priority: job.priority,
            attempts: job.attempts,
            estimated_duration_seconds: job.estimated_duration_seconds,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            queue_position: None,
            estimated_wait_time: None,
            result: match job.status {
                JobStatus::Completed => job.result.clone(),
                _ => None,
            },
            error: match job.status {
                JobStatus::Failed => job.error.clone(),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionOutcome {
    pub job_id: String,
    pub attempts: u32,
    pub result: Value,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CancelOutcome {
    pub job_id: String,
    pub cancelled: bool,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusSummary {
    pub count: u64,
    /// Mean seconds between claim and completion, if any job in the group has both.
    pub avg_duration: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueueSnapshot {
    pub queue_depth: u64,
    pub processing_count: u64,
    pub max_concurrent: usize,
    pub last_24h: BTreeMap<&'static str, StatusSummary>,
}

/// Stats never fail; an unreachable store is reported in-band.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QueueStats {
    Available(QueueSnapshot),
    Unavailable { error: String },
}

impl QueueStats {
    pub fn is_available(&self) -> bool {
        matches!(self, QueueStats::Available(_))
    }
}
