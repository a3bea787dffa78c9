use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Validation(msg) => Self::ValidationError(msg),
            AppError::InvalidOperation(msg) => Self::Conflict(msg),
            _ => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InternalError(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
            Self::ValidationError(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Conflict(message) => (StatusCode::CONFLICT, message),
        };

        let error_response = ErrorResponse {
            error: message,
            status: "error".to_string(),
        };

        (status, Json(error_response)).into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Debug;

    fn assert_status_code<T: IntoResponse + Debug>(response: T, expected_status: StatusCode) {
        let response = response.into_response();
        assert_eq!(response.status(), expected_status);
    }

    #[test]
    fn test_app_error_to_api_error_conversion() {
        let not_found = AppError::NotFound("job 42".to_string());
        let api_error = ApiError::from(not_found);
        assert!(matches!(api_error, ApiError::NotFound(msg) if msg == "job 42"));

        let validation = AppError::Validation("userTier must not be empty".to_string());
        let api_error = ApiError::from(validation);
        assert!(
            matches!(api_error, ApiError::ValidationError(msg) if msg == "userTier must not be empty")
        );

        let invalid = AppError::InvalidOperation("job 42 is completed".to_string());
        let api_error = ApiError::from(invalid);
        assert!(matches!(api_error, ApiError::Conflict(msg) if msg == "job 42 is completed"));

        let processing = AppError::Processing("API rate limit exceeded".to_string());
        assert!(matches!(
            ApiError::from(processing),
            ApiError::InternalError(_)
        ));

        let internal_error = AppError::Io(std::io::Error::other("io error"));
        assert!(matches!(
            ApiError::from(internal_error),
            ApiError::InternalError(_)
        ));
    }

    #[test]
    fn test_api_error_response_status_codes() {
        assert_status_code(
            ApiError::InternalError("server error".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        );
        assert_status_code(
            ApiError::NotFound("not found".to_string()),
            StatusCode::NOT_FOUND,
        );
        assert_status_code(
            ApiError::ValidationError("invalid input".to_string()),
            StatusCode::BAD_REQUEST,
        );
        assert_status_code(
            ApiError::Conflict("not failed".to_string()),
            StatusCode::CONFLICT,
        );
    }

    #[test]
    fn test_internal_error_sanitization() {
        let api_error = ApiError::from(AppError::InternalError(
            "db password incorrect".to_string(),
        ));

        assert_eq!(api_error.to_string(), "Internal server error");
        assert!(matches!(&api_error, ApiError::InternalError(msg) if !msg.contains("password")));
        assert_status_code(api_error, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
