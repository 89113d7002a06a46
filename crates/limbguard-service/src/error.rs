//! API error types

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use limbguard_ai::ClassifyError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::assessor::AssessError;

pub type ApiResult<T> = Result<T, ApiError>;

/// API error with HTTP status code
#[derive(Debug, Clone, Serialize, Error)]
#[error("[{status}] {message}")]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,

    pub message: String,

    /// Stable code for client handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ApiError {
    pub fn with_code(
        status: StatusCode,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            code: Some(code.into()),
        }
    }

    /// 400 Bad Request
    pub fn bad_request(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST, message, code)
    }

    /// 422 Unprocessable Entity
    pub fn validation(message: impl Into<String>) -> Self {
        Self::with_code(StatusCode::UNPROCESSABLE_ENTITY, message, "VALIDATION_ERROR")
    }

    /// 500 Internal Server Error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_code(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_ERROR")
    }
}

impl From<AssessError> for ApiError {
    fn from(err: AssessError) -> Self {
        match err {
            AssessError::Classify(ClassifyError::InvalidInput(reason)) => ApiError::bad_request(
                format!("Invalid image file: {reason}"),
                "INVALID_IMAGE",
            ),
            other => {
                error!(error = %other, "assessment failed");
                ApiError::internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_image_is_bad_request() {
        let err: ApiError =
            AssessError::Classify(ClassifyError::InvalidInput("truncated".into())).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code.as_deref(), Some("INVALID_IMAGE"));
        assert!(err.message.contains("truncated"));
    }

    #[test]
    fn inference_failure_is_internal() {
        let err: ApiError =
            AssessError::Classify(ClassifyError::Inference("session crashed".into())).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code.as_deref(), Some("INTERNAL_ERROR"));
    }

    #[test]
    fn body_omits_status() {
        let json = serde_json::to_value(ApiError::validation("missing `file` field")).unwrap();
        assert_eq!(json["message"], "missing `file` field");
        assert_eq!(json["code"], "VALIDATION_ERROR");
        assert!(json.get("status").is_none());
    }
}
