//! Error types for splitwave-svc

use crate::analysis::DetectionError;
use crate::archive::ArchiveError;
use crate::separation::SeparationError;
use crate::utils::JobError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Decode, analysis, separation or deadline failure (500)
    #[error("Processing failed at {stage}: {message}")]
    Processing { stage: String, message: String },

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// splitwave-common error
    #[error("{0}")]
    Common(#[from] splitwave_common::Error),
}

impl ApiError {
    pub fn processing(stage: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::Processing {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

impl From<DetectionError> for ApiError {
    fn from(err: DetectionError) -> Self {
        ApiError::Processing {
            stage: err.stage.to_string(),
            message: format!(
                "{} (source file present: {})",
                err.message, err.source_present
            ),
        }
    }
}

impl From<SeparationError> for ApiError {
    fn from(err: SeparationError) -> Self {
        match err {
            SeparationError::InvalidTrackName(_) | SeparationError::NothingSelected => {
                ApiError::Validation(err.to_string())
            }
            other => ApiError::processing("separation", other.to_string()),
        }
    }
}

impl From<ArchiveError> for ApiError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::NoTracks => ApiError::NotFound("No tracks found for this session".to_string()),
            // track removed between listing and reading
            ArchiveError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ApiError::NotFound(e.to_string()),
            other => ApiError::processing("archive", other.to_string()),
        }
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::TimedOut(_) => ApiError::processing("timeout", err.to_string()),
            JobError::Panicked(msg) => ApiError::Internal(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use splitwave_common::Error as CommonError;

        let (status, error_code, message) = match self {
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Processing { ref stage, ref message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "PROCESSING_ERROR",
                format!("{} failed: {}", stage, message),
            ),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => match err {
                CommonError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
                CommonError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
                other => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    other.to_string(),
                ),
            },
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, %message, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::processing("decode", "bad"), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ApiError::Common(splitwave_common::Error::NotFound("session".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Common(splitwave_common::Error::InvalidInput("key".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Common(splitwave_common::Error::Internal("boom".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_archive_without_tracks_is_not_found() {
        let err: ApiError = ArchiveError::NoTracks.into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_archive_missing_file_is_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ApiError = ArchiveError::Io(io).into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn test_invalid_track_name_is_validation() {
        let err: ApiError = SeparationError::InvalidTrackName("../x".into()).into();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
