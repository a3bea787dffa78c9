use std::{sync::Arc, time::Duration};

use chrono::{Duration as ChronoDuration, Utc};
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::analysis_job::{AnalysisJob, JobStatus},
    },
};
use tracing::debug;

/// Priority queue view over the persisted jobs.
///
/// Holds no state of its own; every call reads or conditionally updates the
/// store so that any number of worker processes see the same queue.
#[derive(Clone)]
pub struct JobQueue {
    db: Arc<SurrealDbClient>,
}

impl JobQueue {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    /// Makes sure `job` is queued.
    ///
    /// Inserts the record when it does not exist yet and is a no-op when the
    /// stored record is already queued. A stored failed job is moved back to
    /// the queue carrying `job.attempts`; any other stored state is rejected.
    pub async fn push(&self, job: AnalysisJob) -> Result<AnalysisJob, AppError> {
        match AnalysisJob::get(&self.db, &job.id).await? {
            None => {
                if job.status != JobStatus::Queued {
                    return Err(AppError::InvalidOperation(format!(
                        "cannot enqueue job {} with status {}",
                        job.id,
                        job.status.as_str()
                    )));
                }
                job.insert(&self.db).await
            }
            Some(existing) if existing.status == JobStatus::Queued => {
                debug!(job_id = %existing.id, "job already queued");
                Ok(existing)
            }
            Some(mut existing) => {
                existing.attempts = job.attempts;
                existing.requeue(Utc::now(), &self.db).await
            }
        }
    }

    /// Re-queues a failed job so it becomes eligible only after `delay`.
    pub async fn push_delayed(
        &self,
        job: &AnalysisJob,
        delay: Duration,
    ) -> Result<AnalysisJob, AppError> {
        let delay = ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(60));
        job.requeue(Utc::now() + delay, &self.db).await
    }

    /// Best ranked eligible queued job. Does not claim it.
    pub async fn pop(&self) -> Result<Option<AnalysisJob>, AppError> {
        AnalysisJob::find_next_queued(&self.db, Utc::now()).await
    }

    /// Atomically claims the best ranked eligible job while fewer than
    /// `max_concurrent` jobs are processing.
    pub async fn claim(&self, max_concurrent: usize) -> Result<Option<AnalysisJob>, AppError> {
        AnalysisJob::claim_next_ready(&self.db, Utc::now(), max_concurrent).await
    }

    /// Cancels a queued job. Returns `None` when the job is unknown or no
    /// longer queued.
    pub async fn remove(&self, job_id: &str) -> Result<Option<AnalysisJob>, AppError> {
        match AnalysisJob::get(&self.db, job_id).await? {
            Some(job) => job.mark_cancelled(&self.db).await,
            None => Ok(None),
        }
    }

    pub async fn size(&self) -> Result<u64, AppError> {
        AnalysisJob::count_with_status(&self.db, JobStatus::Queued).await
    }

    pub async fn processing_count(&self) -> Result<u64, AppError> {
        AnalysisJob::count_with_status(&self.db, JobStatus::Processing).await
    }

    /// 1-based position of a queued job.
    pub async fn position(&self, job_id: &str) -> Result<u64, AppError> {
        let job = AnalysisJob::get(&self.db, job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))?;

        if job.status != JobStatus::Queued {
            return Err(AppError::InvalidOperation(format!(
                "job {job_id} is {} and has no queue position",
                job.status.as_str()
            )));
        }

        job.queue_position(&self.db).await
    }
}
