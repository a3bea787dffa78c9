#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod config;
pub mod executor;
pub mod manager;
pub mod queue;
pub mod scheduler;

use std::sync::Arc;

use common::error::AppError;
pub use config::{QueueConfig, QueueTuning};
pub use executor::{
    AnalysisExecutor, ErrorKind, ExecutionError, RemoteAnalysisExecutor, RETRYABLE_PATTERNS,
};
pub use manager::{
    CancelOutcome, ExecutionOutcome, JobStatusView, QueueManager, QueueReceipt, QueueSnapshot,
    QueueStats, StatusSummary,
};
pub use queue::JobQueue;
use tokio::{task::JoinHandle, time::sleep};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Runs jobs from the shared queue until the task is dropped.
///
/// Sleeps for the idle backoff when nothing is eligible or all slots are in
/// use, and for the error backoff when the store cannot be reached.
pub async fn run_worker_loop(manager: Arc<QueueManager>, worker_id: String) {
    let tuning = manager.config().tuning.clone();
    info!(%worker_id, "analysis worker started");

    loop {
        match manager.process_next().await {
            Ok(Some(outcome)) => {
                info!(
                    %worker_id,
                    job_id = %outcome.job_id,
                    duration_ms = outcome.duration_ms,
                    "analysis job finished"
                );
            }
            Ok(None) => {
                sleep(tuning.idle_backoff).await;
            }
            Err(AppError::Processing(reason)) => {
                error!(%worker_id, error = %reason, "analysis job failed");
            }
            Err(err) => {
                error!(%worker_id, error = %err, "failed to claim analysis job");
                warn!(
                    "Backing off for {}ms after queue error",
                    tuning.error_backoff.as_millis()
                );
                sleep(tuning.error_backoff).await;
            }
        }
    }
}

/// Starts `count` workers sharing one manager. The concurrency cap is enforced
/// by the store, so extra workers only wait.
pub fn spawn_workers(manager: &Arc<QueueManager>, count: usize) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|_| {
            let worker_id = format!("analysis-worker-{}", Uuid::new_v4());
            tokio::spawn(run_worker_loop(Arc::clone(manager), worker_id))
        })
        .collect()
}
