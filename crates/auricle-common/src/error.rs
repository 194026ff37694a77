//! Shared error taxonomy for errors that cross an HTTP or signaling boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuricleError {
    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("no audio file present in upload")]
    NoAudio,

    #[error("resource not found: {kind} {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("sfu failure: {0}")]
    Sfu(String),

    #[error("port contention: {0}")]
    PortContention(String),

    #[error("pipeline exited early: {0}")]
    PipelineExit(String),

    #[error("forward failed: status={status:?} body={body}")]
    Forward {
        status: Option<u16>,
        body: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuricleError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuricleError::Validation { .. } => StatusCode::BAD_REQUEST,
            AuricleError::NoAudio => StatusCode::BAD_REQUEST,
            AuricleError::NotFound { .. } => StatusCode::NOT_FOUND,
            AuricleError::Sfu(_) => StatusCode::BAD_GATEWAY,
            AuricleError::PortContention(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuricleError::PipelineExit(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuricleError::Forward { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AuricleError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuricleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AuricleError::Validation { .. } => "validation_error",
            AuricleError::NoAudio => "no_audio",
            AuricleError::NotFound { .. } => "not_found",
            AuricleError::Sfu(_) => "sfu_error",
            AuricleError::PortContention(_) => "port_contention",
            AuricleError::PipelineExit(_) => "pipeline_exit",
            AuricleError::Forward { .. } => "forward_failed",
            AuricleError::Io(_) => "io_error",
            AuricleError::Internal(_) => "internal_error",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    python_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    python_body: Option<String>,
}

impl IntoResponse for AuricleError {
    fn into_response(self) -> Response {
        if matches!(self.status_code(), StatusCode::INTERNAL_SERVER_ERROR) {
            tracing::error!(error = %self, "internal error crossed boundary");
        }

        let body = match &self {
            AuricleError::Forward { status, body } => ErrorResponse {
                error: "forward_failed".into(),
                detail: Some(self.to_string()),
                python_status: *status,
                python_body: Some(body.clone()),
            },
            other => ErrorResponse {
                error: other.error_code().to_string(),
                detail: Some(other.to_string()),
                python_status: None,
                python_body: None,
            },
        };

        (self.status_code(), axum::Json(body)).into_response()
    }
}

pub type AuricleResult<T> = Result<T, AuricleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_audio_maps_to_400_with_no_audio_code() {
        let err = AuricleError::NoAudio;
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), "no_audio");
    }

    #[test]
    fn forward_error_maps_to_500_forward_failed() {
        let err = AuricleError::Forward { status: Some(502), body: "bad gateway".into() };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "forward_failed");
    }

    #[test]
    fn port_contention_maps_to_503() {
        let err = AuricleError::PortContention("in use".into());
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
