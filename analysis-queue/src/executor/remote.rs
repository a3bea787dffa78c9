use std::time::Duration;

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::types::{analysis_job::AnalysisJob, analysis_request::AnalysisRequest},
    utils::config::AppConfig,
};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{AnalysisExecutor, ExecutionError};

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Hands jobs to an external analysis service over HTTP.
pub struct RemoteAnalysisExecutor {
    client: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct ExecutionRequest<'a> {
    job_id: &'a str,
    job_type: &'a str,
    attempt: u32,
    payload: &'a AnalysisRequest,
}

impl RemoteAnalysisExecutor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let endpoint = config
            .analysis_executor_url
            .clone()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                AppError::Validation("analysis_executor_url must be configured".into())
            })?;

        Self::new(
            endpoint,
            Duration::from_secs(config.analysis_executor_timeout_secs),
        )
    }
}

fn classify_status(status: StatusCode, body: &str) -> ExecutionError {
    let detail: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            ExecutionError::transient(format!("API rate limit exceeded: {detail}"))
        }
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            ExecutionError::transient(format!(
                "Temporary service unavailable ({status}): {detail}"
            ))
        }
        status if status.is_client_error() => {
            ExecutionError::validation(format!("Analysis rejected ({status}): {detail}"))
        }
        status => ExecutionError::permanent(format!("Analysis failed ({status}): {detail}")),
    }
}

fn classify_transport(err: &reqwest::Error) -> ExecutionError {
    if err.is_timeout() {
        ExecutionError::transient(format!("Network timeout: {err}"))
    } else if err.is_connect() {
        ExecutionError::transient(format!("Connection timeout: {err}"))
    } else {
        ExecutionError::classify(err.to_string())
    }
}

#[async_trait]
impl AnalysisExecutor for RemoteAnalysisExecutor {
    async fn execute(&self, job: &AnalysisJob) -> Result<Value, ExecutionError> {
        let request = ExecutionRequest {
            job_id: &job.id,
            job_type: &job.job_type,
            attempt: job.attempts,
            payload: &job.payload,
        };

        debug!(job_id = %job.id, endpoint = %self.endpoint, "dispatching analysis job");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| classify_transport(&err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| classify_transport(&err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ErrorKind;

    #[test]
    fn test_status_classification() {
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert_eq!(err.kind, ErrorKind::Transient);
        assert!(err.message.contains("API rate limit"));

        let err = classify_status(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(err.kind, ErrorKind::Transient);
        assert!(err.message.contains("Temporary service unavailable"));

        let err = classify_status(StatusCode::UNPROCESSABLE_ENTITY, "bad schema");
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(err.message.contains("bad schema"));

        let err = classify_status(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert_eq!(err.kind, ErrorKind::Permanent);
    }

    #[test]
    fn test_error_body_is_truncated() {
        let body = "x".repeat(MAX_ERROR_BODY_CHARS * 2);
        let err = classify_status(StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert!(err.message.len() < body.len());
    }

    #[test]
    fn test_from_config_requires_endpoint() {
        let config = AppConfig::default();
        assert!(matches!(
            RemoteAnalysisExecutor::from_config(&config),
            Err(AppError::Validation(_))
        ));

        let config = AppConfig {
            analysis_executor_url: Some("http://localhost:9000/analyze".into()),
            ..AppConfig::default()
        };
        let executor = RemoteAnalysisExecutor::from_config(&config).expect("executor");
        assert_eq!(executor.endpoint, "http://localhost:9000/analyze");
    }
}
