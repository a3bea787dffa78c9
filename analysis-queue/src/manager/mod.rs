mod views;

pub use views::{
    CancelOutcome, ExecutionOutcome, JobStatusView, QueueReceipt, QueueSnapshot, QueueStats,
    StatusSummary,
};

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use chrono::{Duration as ChronoDuration, Utc};
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            analysis_job::{AnalysisJob, JobStatus, MAX_ATTEMPTS},
            analysis_request::AnalysisRequest,
        },
    },
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    config::QueueConfig,
    executor::{AnalysisExecutor, ExecutionError},
    queue::JobQueue,
    scheduler,
};

/// Entry point for submitting, running and inspecting analysis jobs.
pub struct QueueManager {
    db: Arc<SurrealDbClient>,
    queue: JobQueue,
    executor: Arc<dyn AnalysisExecutor>,
    config: QueueConfig,
}

impl QueueManager {
    pub fn new(
        db: Arc<SurrealDbClient>,
        executor: Arc<dyn AnalysisExecutor>,
        config: QueueConfig,
    ) -> Self {
        Self {
            queue: JobQueue::new(Arc::clone(&db)),
            db,
            executor,
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Validates a raw submission and queues it.
    pub async fn queue_analysis(&self, request: Value) -> Result<QueueReceipt, AppError> {
        let request = AnalysisRequest::from_value(request)?;
        self.submit(request).await
    }

    /// Queues an already parsed request. Identical requests produce
    /// independent jobs.
    pub async fn submit(&self, request: AnalysisRequest) -> Result<QueueReceipt, AppError> {
        request.validate()?;

        let priority = scheduler::compute_priority(&request);
        let estimated_duration = scheduler::estimate_processing_time(&request);

        let queue_depth = self.queue.size().await?;
        let avg_processing_secs = self.average_processing_secs().await?;

        let job = self
            .queue
            .push(AnalysisJob::new(request, priority, estimated_duration))
            .await?;
        let queue_position = job.queue_position(&self.db).await?;

        info!(
            job_id = %job.id,
            priority,
            estimated_duration,
            queue_position,
            "queued analysis job"
        );

        Ok(QueueReceipt {
            job_id: job.id,
            status: job.status,
            priority: job.priority,
            estimated_wait_time: scheduler::estimate_wait_time(
                queue_depth,
                avg_processing_secs,
                self.config.max_concurrent_jobs,
            ),
            queue_position,
        })
    }

    /// Claims and runs one job.
    ///
    /// Returns `Ok(None)` when nothing is eligible or when the concurrency cap
    /// is reached. Executor failures are recorded on the job first and then
    /// returned as `AppError::Processing`.
    #[tracing::instrument(skip_all, fields(max_concurrent = self.config.max_concurrent_jobs))]
    pub async fn process_next(&self) -> Result<Option<ExecutionOutcome>, AppError> {
        let Some(job) = self.queue.claim(self.config.max_concurrent_jobs).await? else {
            return Ok(None);
        };

        info!(
            job_id = %job.id,
            attempt = job.attempts,
            priority = job.priority,
            "claimed analysis job"
        );

        let started = Instant::now();
        match self.executor.execute(&job).await {
            Ok(result) => {
                let completed = job.mark_completed(result.clone(), &self.db).await?;
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                info!(
                    job_id = %completed.id,
                    attempt = completed.attempts,
                    duration_ms,
                    "analysis job completed"
                );

                Ok(Some(ExecutionOutcome {
                    job_id: completed.id,
                    attempts: completed.attempts,
                    result,
                    duration_ms,
                }))
            }
            Err(err) => {
                debug!(job_id = %job.id, kind = ?err.kind, error = %err, "analysis executor failed");
                self.handle_failure(&job, &err).await?;
                Err(AppError::Processing(err.message))
            }
        }
    }

    async fn handle_failure(
        &self,
        job: &AnalysisJob,
        err: &ExecutionError,
    ) -> Result<AnalysisJob, AppError> {
        let failed = job.mark_failed(&err.message, &self.db).await?;

        if err.is_retryable() && failed.can_retry() {
            let requeued = self
                .queue
                .push_delayed(&failed, self.config.retry_delay)
                .await?;
            warn!(
                job_id = %requeued.id,
                attempt = requeued.attempts,
                retry_in_secs = self.config.retry_delay.as_secs(),
                "analysis job failed; scheduled retry"
            );
            Ok(requeued)
        } else {
            warn!(
                job_id = %failed.id,
                attempt = failed.attempts,
                kind = ?err.kind,
                "analysis job failed; waiting for explicit retry"
            );
            Ok(failed)
        }
    }

    pub async fn get_job_status(&self, job_id: &str) -> Result<JobStatusView, AppError> {
        let job = self.find_job(job_id).await?;
        self.status_view(&job).await
    }

    /// Cancels a queued job. Jobs in any other state are left untouched and
    /// reported with `cancelled: false`; a running executor is not interrupted.
    pub async fn cancel_job(&self, job_id: &str) -> Result<CancelOutcome, AppError> {
        if let Some(cancelled) = self.queue.remove(job_id).await? {
            info!(job_id = %cancelled.id, "cancelled analysis job");
            return Ok(CancelOutcome {
                job_id: cancelled.id,
                cancelled: true,
                status: cancelled.status,
            });
        }

        let job = self.find_job(job_id).await?;
        debug!(job_id = %job.id, status = job.status.as_str(), "cancel ignored; job not queued");

        Ok(CancelOutcome {
            job_id: job.id,
            cancelled: false,
            status: job.status,
        })
    }

    /// Puts a failed job back in the queue, counting the retry as an attempt.
    pub async fn retry_job(&self, job_id: &str) -> Result<JobStatusView, AppError> {
        let job = self.find_job(job_id).await?;

        if job.status != JobStatus::Failed {
            return Err(AppError::InvalidOperation(format!(
                "job {job_id} is {}; only failed jobs can be retried",
                job.status.as_str()
            )));
        }
        if !job.can_retry() {
            return Err(AppError::InvalidOperation(format!(
                "job {job_id} has used all {MAX_ATTEMPTS} attempts"
            )));
        }

        let mut retry = job;
        retry.attempts = retry.attempts.saturating_add(1);
        retry.error = None;
        let requeued = self.queue.push(retry).await?;

        info!(
            job_id = %requeued.id,
            attempt = requeued.attempts,
            "analysis job re-queued by request"
        );

        self.status_view(&requeued).await
    }

    pub async fn get_queue_stats(&self) -> QueueStats {
        match self.collect_stats().await {
            Ok(snapshot) => QueueStats::Available(snapshot),
            Err(err) => {
                warn!(error = %err, "queue stats unavailable");
                QueueStats::Unavailable {
                    error: err.to_string(),
                }
            }
        }
    }

    async fn collect_stats(&self) -> Result<QueueSnapshot, AppError> {
        let queue_depth = self.queue.size().await?;
        let processing_count = self.queue.processing_count().await?;
        let jobs = AnalysisJob::created_since(&self.db, self.window_start()).await?;

        let mut groups: BTreeMap<&'static str, (u64, Vec<f64>)> = BTreeMap::new();
        for job in &jobs {
            let entry = groups.entry(job.status.as_str()).or_default();
            entry.0 = entry.0.saturating_add(1);
            if let Some(duration) = job.processing_duration() {
                entry.1.push(duration_secs(duration));
            }
        }

        let last_24h = groups
            .into_iter()
            .map(|(status, (count, durations))| {
                (
                    status,
                    StatusSummary {
                        count,
                        avg_duration: mean(&durations),
                    },
                )
            })
            .collect();

        Ok(QueueSnapshot {
            queue_depth,
            processing_count,
            max_concurrent: self.config.max_concurrent_jobs,
            last_24h,
        })
    }

    async fn find_job(&self, job_id: &str) -> Result<AnalysisJob, AppError> {
        AnalysisJob::get(&self.db, job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))
    }

    async fn status_view(&self, job: &AnalysisJob) -> Result<JobStatusView, AppError> {
        let mut view = JobStatusView::from_job(job);

        if job.status == JobStatus::Queued {
            let position = job.queue_position(&self.db).await?;
            let avg_processing_secs = self.average_processing_secs().await?;
            view.queue_position = Some(position);
            view.estimated_wait_time = Some(scheduler::estimate_wait_time(
                position.saturating_sub(1),
                avg_processing_secs,
                self.config.max_concurrent_jobs,
            ));
        }

        Ok(view)
    }

    /// Mean processing time of jobs completed inside the stats window.
    async fn average_processing_secs(&self) -> Result<f64, AppError> {
        let completed = AnalysisJob::completed_since(&self.db, self.window_start()).await?;
        let durations: Vec<f64> = completed
            .iter()
            .filter_map(AnalysisJob::processing_duration)
            .map(duration_secs)
            .collect();

        Ok(mean(&durations).unwrap_or(self.config.tuning.default_processing_secs))
    }

    fn window_start(&self) -> chrono::DateTime<Utc> {
        let window = ChronoDuration::from_std(self.config.tuning.stats_window)
            .unwrap_or_else(|_| ChronoDuration::hours(24));
        Utc::now() - window
    }
}

#[allow(clippy::cast_precision_loss)]
fn duration_secs(duration: ChronoDuration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.0
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
