use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    pub http_port: u16,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Number of worker loops to start; falls back to `max_concurrent_jobs`.
    #[serde(default)]
    pub worker_count: Option<usize>,
    #[serde(default = "default_worker_poll_interval_ms")]
    pub worker_poll_interval_ms: u64,
    #[serde(default)]
    pub analysis_executor_url: Option<String>,
    #[serde(default = "default_analysis_executor_timeout_secs")]
    pub analysis_executor_timeout_secs: u64,
}

fn default_max_concurrent_jobs() -> usize {
    5
}

fn default_retry_delay_secs() -> u64 {
    60
}

fn default_worker_poll_interval_ms() -> u64 {
    500
}

fn default_analysis_executor_timeout_secs() -> u64 {
    300
}

impl AppConfig {
    pub fn effective_worker_count(&self) -> usize {
        self.worker_count
            .unwrap_or(self.max_concurrent_jobs)
            .max(1)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: "root".to_string(),
            surrealdb_password: "root".to_string(),
            surrealdb_namespace: "campaign".to_string(),
            surrealdb_database: "analysis".to_string(),
            http_port: 3000,
            max_concurrent_jobs: default_max_concurrent_jobs(),
            retry_delay_secs: default_retry_delay_secs(),
            worker_count: None,
            worker_poll_interval_ms: default_worker_poll_interval_ms(),
            analysis_executor_url: None,
            analysis_executor_timeout_secs: default_analysis_executor_timeout_secs(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
