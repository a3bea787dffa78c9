use chrono::Duration as ChronoDuration;
use serde_json::Value;
use state_machines::state_machine;
use std::time::Duration;
use surrealdb::sql::Datetime as SurrealDatetime;
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::analysis_request::AnalysisRequest;

pub const JOB_TYPE: &str = "campaign_analysis";
pub const MAX_ATTEMPTS: u32 = 3;
pub const MIN_PRIORITY: i32 = 1;
pub const MAX_PRIORITY: i32 = 100;

const MAX_CLAIM_CONFLICT_RETRIES: u32 = 4;
const CLAIM_CONFLICT_BACKOFF_MS: u64 = 5;

#[derive(
    Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum JobTransition {
    Claim,
    Complete,
    Fail,
    Requeue,
    Cancel,
}

impl JobTransition {
    fn as_str(&self) -> &'static str {
        match self {
            JobTransition::Claim => "claim",
            JobTransition::Complete => "complete",
            JobTransition::Fail => "fail",
            JobTransition::Requeue => "requeue",
            JobTransition::Cancel => "cancel",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: JobLifecycleMachine,
        initial: Queued,
        states: [Queued, Processing, Completed, Failed, Cancelled],
        events {
            claim {
                transition: { from: Queued, to: Processing }
            }
            complete {
                transition: { from: Processing, to: Completed }
            }
            fail {
                transition: { from: Processing, to: Failed }
            }
            requeue {
                transition: { from: Failed, to: Queued }
            }
            cancel {
                transition: { from: Queued, to: Cancelled }
            }
        }
    }

    pub(super) fn queued() -> JobLifecycleMachine<(), Queued> {
        JobLifecycleMachine::new(())
    }

    pub(super) fn processing() -> JobLifecycleMachine<(), Processing> {
        queued()
            .claim()
            .expect("claim transition from Queued should exist")
    }

    pub(super) fn failed() -> JobLifecycleMachine<(), Failed> {
        processing()
            .fail()
            .expect("fail transition from Processing should exist")
    }
}

fn invalid_transition(status: &JobStatus, event: JobTransition) -> AppError {
    AppError::InvalidOperation(format!(
        "Invalid job transition: {} -> {}",
        status.as_str(),
        event.as_str()
    ))
}

/// SurrealDB reports optimistic write conflicts between concurrent claims this way.
fn is_retryable_conflict(message: &str) -> bool {
    message.contains("Failed to commit transaction due to a read or write conflict")
        || message.contains("This transaction can be retried")
}

fn compute_next_state(status: &JobStatus, event: JobTransition) -> Result<JobStatus, AppError> {
    use lifecycle::*;
    match (status, event) {
        (JobStatus::Queued, JobTransition::Claim) => queued()
            .claim()
            .map(|_| JobStatus::Processing)
            .map_err(|_| invalid_transition(status, event)),
        (JobStatus::Processing, JobTransition::Complete) => processing()
            .complete()
            .map(|_| JobStatus::Completed)
            .map_err(|_| invalid_transition(status, event)),
        (JobStatus::Processing, JobTransition::Fail) => processing()
            .fail()
            .map(|_| JobStatus::Failed)
            .map_err(|_| invalid_transition(status, event)),
        (JobStatus::Failed, JobTransition::Requeue) => failed()
            .requeue()
            .map(|_| JobStatus::Queued)
            .map_err(|_| invalid_transition(status, event)),
        (JobStatus::Queued, JobTransition::Cancel) => queued()
            .cancel()
            .map(|_| JobStatus::Cancelled)
            .map_err(|_| invalid_transition(status, event)),
        _ => Err(invalid_transition(status, event)),
    }
}

stored_object!(AnalysisJob, "analysis_job", {
    job_type: String,
    payload: AnalysisRequest,
    priority: i32,
    status: JobStatus,
    attempts: u32,
    estimated_duration_seconds: u64,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    last_error: Option<String>
});

#[derive(Debug, serde::Deserialize)]
struct CountResult {
    count: u64,
}

impl AnalysisJob {
    pub fn new(payload: AnalysisRequest, priority: i32, estimated_duration_seconds: u64) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            job_type: JOB_TYPE.to_string(),
            payload,
            priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
            status: JobStatus::Queued,
            attempts: 0,
            estimated_duration_seconds,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < MAX_ATTEMPTS
    }

    /// Wall-clock time between claim and completion, when both are known.
    pub fn processing_duration(&self) -> Option<ChronoDuration> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) if completed >= started => {
                Some(completed - started)
            }
            _ => None,
        }
    }

    pub async fn insert(self, db: &SurrealDbClient) -> Result<AnalysisJob, AppError> {
        let id = self.id.clone();
        let stored: Option<AnalysisJob> = db.store_item(self).await?;
        stored.ok_or_else(|| AppError::InternalError(format!("Failed to persist job {id}")))
    }

    pub async fn get(db: &SurrealDbClient, id: &str) -> Result<Option<AnalysisJob>, AppError> {
        Ok(db.get_item::<AnalysisJob>(id).await?)
    }

    /// Highest ranked queued job that is eligible at `now`, without claiming it.
    pub async fn find_next_queued(
        db: &SurrealDbClient,
        now: DateTime<Utc>,
    ) -> Result<Option<AnalysisJob>, AppError> {
        let job: Option<AnalysisJob> = db
            .query(
                "SELECT * FROM type::table($table)
                 WHERE status = $queued AND created_at <= $now
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("queued", JobStatus::Queued.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .await?
            .take(0)?;

        Ok(job)
    }

    /// Claims the best ranked eligible job as long as fewer than `max_concurrent`
    /// jobs are processing.
    ///
    /// The capacity check, the selection and the status change run as one
    /// statement, so two workers can never both claim the last free slot. A
    /// claim that loses a write conflict to another worker is retried a few
    /// times and then reported as `None`.
    pub async fn claim_next_ready(
        db: &SurrealDbClient,
        now: DateTime<Utc>,
        max_concurrent: usize,
    ) -> Result<Option<AnalysisJob>, AppError> {
        debug_assert!(compute_next_state(&JobStatus::Queued, JobTransition::Claim).is_ok());

        let mut backoff_ms = CLAIM_CONFLICT_BACKOFF_MS;
        for attempt in 1..=MAX_CLAIM_CONFLICT_RETRIES {
            match Self::try_claim(db, now, max_concurrent).await {
                Ok(job) => return Ok(job),
                Err(err) if is_retryable_conflict(&err.to_string()) => {
                    debug!(attempt, "claim lost a write conflict; retrying");
                    sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = backoff_ms.saturating_mul(2);
                }
                Err(err) => return Err(AppError::from(err)),
            }
        }

        debug!("claim still conflicting after retries; yielding");
        Ok(None)
    }

    async fn try_claim(
        db: &SurrealDbClient,
        now: DateTime<Utc>,
        max_concurrent: usize,
    ) -> Result<Option<AnalysisJob>, surrealdb::Error> {
        // The processing count is evaluated once, before any candidate is read.
        const CLAIM_QUERY: &str = r#"
            IF array::len(
                (SELECT VALUE id FROM type::table($table) WHERE status = $processing)
            ) < $max_concurrent THEN
                (UPDATE (
                    SELECT * FROM type::table($table)
                    WHERE status = $queued AND created_at <= $now
                    ORDER BY priority DESC, created_at ASC
                    LIMIT 1
                )
                SET status = $processing,
                    started_at = $now,
                    completed_at = NONE,
                    updated_at = $now
                WHERE status = $queued
                RETURN AFTER)
            ELSE
                []
            END;
        "#;

        let mut result = db
            .client
            .query(CLAIM_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("queued", JobStatus::Queued.as_str()))
            .bind(("processing", JobStatus::Processing.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .bind((
                "max_concurrent",
                i64::try_from(max_concurrent).unwrap_or(i64::MAX),
            ))
            .await?;

        result.take(0)
    }

    pub async fn mark_completed(
        &self,
        result: Value,
        db: &SurrealDbClient,
    ) -> Result<AnalysisJob, AppError> {
        let next = compute_next_state(&self.status, JobTransition::Complete)?;
        debug_assert_eq!(next, JobStatus::Completed);

        const COMPLETE_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET status = $completed,
                result = $result,
                error = NONE,
                completed_at = $now,
                updated_at = $now
            WHERE status = $processing
            RETURN AFTER;
        "#;

        let now = Utc::now();
        let mut response = db
            .client
            .query(COMPLETE_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("completed", JobStatus::Completed.as_str()))
            .bind(("processing", JobStatus::Processing.as_str()))
            .bind(("result", result))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<AnalysisJob> = response.take(0)?;
        updated.ok_or_else(|| invalid_transition(&self.status, JobTransition::Complete))
    }

    /// Records a failed execution: bumps `attempts` (never past `MAX_ATTEMPTS`)
    /// and keeps the error text.
    pub async fn mark_failed(
        &self,
        message: &str,
        db: &SurrealDbClient,
    ) -> Result<AnalysisJob, AppError> {
        let next = compute_next_state(&self.status, JobTransition::Fail)?;
        debug_assert_eq!(next, JobStatus::Failed);

        const FAIL_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET status = $failed,
                attempts = if attempts + 1 > $max_attempts THEN $max_attempts ELSE attempts + 1 END,
                error = $message,
                last_error = $message,
                completed_at = $now,
                updated_at = $now
            WHERE status = $processing
            RETURN AFTER;
        "#;

        let now = Utc::now();
        let mut response = db
            .client
            .query(FAIL_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("failed", JobStatus::Failed.as_str()))
            .bind(("processing", JobStatus::Processing.as_str()))
            .bind(("max_attempts", MAX_ATTEMPTS))
            .bind(("message", message.to_string()))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<AnalysisJob> = response.take(0)?;
        updated.ok_or_else(|| invalid_transition(&self.status, JobTransition::Fail))
    }

    /// Moves a failed job back into the queue, eligible from `available_at`.
    ///
    /// Persists this record's `attempts` value (capped at `MAX_ATTEMPTS`) and
    /// clears the current error. `created_at` doubles as the eligibility time.
    pub async fn requeue(
        &self,
        available_at: DateTime<Utc>,
        db: &SurrealDbClient,
    ) -> Result<AnalysisJob, AppError> {
        let next = compute_next_state(&self.status, JobTransition::Requeue)?;
        debug_assert_eq!(next, JobStatus::Queued);

        const REQUEUE_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET status = $queued,
                attempts = $attempts,
                error = NONE,
                created_at = $available_at,
                started_at = NONE,
                completed_at = NONE,
                updated_at = $now
            WHERE status = $failed
            RETURN AFTER;
        "#;

        let now = Utc::now();
        let mut response = db
            .client
            .query(REQUEUE_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("queued", JobStatus::Queued.as_str()))
            .bind(("failed", JobStatus::Failed.as_str()))
            .bind(("attempts", self.attempts.min(MAX_ATTEMPTS)))
            .bind(("available_at", SurrealDatetime::from(available_at)))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<AnalysisJob> = response.take(0)?;
        updated.ok_or_else(|| invalid_transition(&self.status, JobTransition::Requeue))
    }

    /// Cancels the job if it is still queued. Returns `None` when the stored
    /// record was in any other state.
    pub async fn mark_cancelled(
        &self,
        db: &SurrealDbClient,
    ) -> Result<Option<AnalysisJob>, AppError> {
        if compute_next_state(&self.status, JobTransition::Cancel).is_err() {
            return Ok(None);
        }

        const CANCEL_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET status = $cancelled,
                updated_at = $now
            WHERE status = $queued
            RETURN AFTER;
        "#;

        let now = Utc::now();
        let mut response = db
            .client
            .query(CANCEL_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("cancelled", JobStatus::Cancelled.as_str()))
            .bind(("queued", JobStatus::Queued.as_str()))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<AnalysisJob> = response.take(0)?;
        Ok(updated)
    }

    pub async fn count_with_status(
        db: &SurrealDbClient,
        status: JobStatus,
    ) -> Result<u64, AppError> {
        let result: Option<CountResult> = db
            .query(
                "SELECT count() AS count FROM type::table($table)
                 WHERE status = $status
                 GROUP ALL",
            )
            .bind(("table", Self::table_name()))
            .bind(("status", status.as_str()))
            .await?
            .take(0)?;

        Ok(result.map(|r| r.count).unwrap_or(0))
    }

    /// 1-based rank of this job among all queued jobs.
    pub async fn queue_position(&self, db: &SurrealDbClient) -> Result<u64, AppError> {
        let ahead: Option<CountResult> = db
            .query(
                "SELECT count() AS count FROM type::table($table)
                 WHERE status = $queued
                   AND id != type::thing($table, $id)
                   AND (priority > $priority
                        OR (priority = $priority AND created_at < $created_at))
                 GROUP ALL",
            )
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("queued", JobStatus::Queued.as_str()))
            .bind(("priority", self.priority))
            .bind(("created_at", SurrealDatetime::from(self.created_at)))
            .await?
            .take(0)?;

        Ok(ahead.map(|r| r.count).unwrap_or(0).saturating_add(1))
    }

    pub async fn created_since(
        db: &SurrealDbClient,
        since: DateTime<Utc>,
    ) -> Result<Vec<AnalysisJob>, AppError> {
        let jobs: Vec<AnalysisJob> = db
            .query(
                "SELECT * FROM type::table($table)
                 WHERE created_at >= $since
                 ORDER BY created_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("since", SurrealDatetime::from(since)))
            .await?
            .take(0)?;

        Ok(jobs)
    }

    pub async fn completed_since(
        db: &SurrealDbClient,
        since: DateTime<Utc>,
    ) -> Result<Vec<AnalysisJob>, AppError> {
        let jobs: Vec<AnalysisJob> = db
            .query(
                "SELECT * FROM type::table($table)
                 WHERE status = $completed AND completed_at >= $since
                 ORDER BY completed_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("completed", JobStatus::Completed.as_str()))
            .bind(("since", SurrealDatetime::from(since)))
            .await?
            .take(0)?;

        Ok(jobs)
    }
}
