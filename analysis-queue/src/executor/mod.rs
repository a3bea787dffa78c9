mod remote;

pub use remote::RemoteAnalysisExecutor;

use async_trait::async_trait;
use common::storage::types::analysis_job::AnalysisJob;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Failure messages that mark an execution error as transient when the
/// executor does not classify the error itself. Matching is a case-sensitive
/// substring test.
pub const RETRYABLE_PATTERNS: [&str; 4] = [
    "API rate limit",
    "Network timeout",
    "Temporary service unavailable",
    "Connection timeout",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Transient,
    Permanent,
    Validation,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ExecutionError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: message.into(),
        }
    }

    /// Builds an error from bare text using the default pattern mapping.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_retryable_message(&message) {
            Self::transient(message)
        } else {
            Self::permanent(message)
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

pub fn is_retryable_message(message: &str) -> bool {
    RETRYABLE_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
}

impl From<String> for ExecutionError {
    fn from(message: String) -> Self {
        Self::classify(message)
    }
}

impl From<&str> for ExecutionError {
    fn from(message: &str) -> Self {
        Self::classify(message)
    }
}

impl From<anyhow::Error> for ExecutionError {
    fn from(err: anyhow::Error) -> Self {
        Self::classify(format!("{err:#}"))
    }
}

/// Performs the actual campaign analysis for a claimed job.
///
/// Implementations receive the job exactly as stored, including the untouched
/// request payload, and return the result document to persist.
#[async_trait]
pub trait AnalysisExecutor: Send + Sync {
    async fn execute(&self, job: &AnalysisJob) -> Result<Value, ExecutionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_default_pattern_mapping() {
        for message in [
            "API rate limit exceeded",
            "Network timeout after 30s",
            "Temporary service unavailable (503)",
            "Connection timeout while reaching provider",
        ] {
            let err = ExecutionError::classify(message);
            assert_eq!(err.kind, ErrorKind::Transient, "{message}");
            assert!(err.is_retryable());
        }

        let err = ExecutionError::from("Invalid campaign schema");
        assert_eq!(err.kind, ErrorKind::Permanent);
        assert!(!err.is_retryable());

        // matching is case sensitive
        assert_eq!(
            ExecutionError::classify("network timeout").kind,
            ErrorKind::Permanent
        );
    }

    #[test]
    fn test_explicit_kinds_win_over_text() {
        assert!(!ExecutionError::permanent("API rate limit").is_retryable());
        assert!(!ExecutionError::validation("Network timeout").is_retryable());
        assert!(ExecutionError::transient("provider quota reset pending").is_retryable());
    }

    #[test]
    fn test_anyhow_context_is_classified() {
        let err: Result<(), anyhow::Error> = Err(anyhow::anyhow!("Network timeout after 30s"));
        let err = err.context("calling analysis provider").expect_err("error");

        let classified = ExecutionError::from(err);
        assert_eq!(classified.kind, ErrorKind::Transient);
        assert!(classified.message.starts_with("calling analysis provider"));
        assert_eq!(classified.to_string(), classified.message);
    }
}
