use std::time::Duration;

use common::utils::config::AppConfig;

#[derive(Debug, Clone)]
pub struct QueueTuning {
    /// Average processing time assumed while no job has completed in the window.
    pub default_processing_secs: f64,
    pub stats_window: Duration,
    pub idle_backoff: Duration,
    pub error_backoff: Duration,
}

impl Default for QueueTuning {
    fn default() -> Self {
        Self {
            default_processing_secs: 30.0,
            stats_window: Duration::from_secs(24 * 60 * 60),
            idle_backoff: Duration::from_millis(500),
            error_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_concurrent_jobs: usize,
    pub retry_delay: Duration,
    pub tuning: QueueTuning,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 5,
            retry_delay: Duration::from_secs(60),
            tuning: QueueTuning::default(),
        }
    }
}

impl QueueConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_concurrent_jobs: config.max_concurrent_jobs.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            tuning: QueueTuning {
                idle_backoff: Duration::from_millis(config.worker_poll_interval_ms),
                ..QueueTuning::default()
            },
        }
    }
}
