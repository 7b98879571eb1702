//! Client-visible error taxonomy.
//!
//! Every failure that reaches a client before streaming begins is mapped to
//! the stable OpenAI-style envelope `{"error": {"message", "type"}}`.
//! Failures after the first chunk has been sent truncate the stream instead
//! (see [`crate::server::streaming`]).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

use crate::backend::cli::BackendError;

/// Failures the relay surfaces to clients.
#[derive(Error, Debug)]
pub enum RelayError {
    /// The request payload is malformed (bad JSON, unknown role, empty
    /// messages).
    #[error("{0}")]
    InvalidRequest(String),

    /// The requested model name has no mapping.
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    /// The Claude CLI binary was not found at startup.
    #[error("Claude CLI not available")]
    BackendUnavailable,

    /// The backend invocation failed before any output reached the client.
    #[error(transparent)]
    Upstream(#[from] BackendError),
}

impl RelayError {
    /// HTTP status for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RelayError::UnknownModel(_) => StatusCode::NOT_FOUND,
            RelayError::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Stable wire `type` string for this failure.
    pub fn error_type(&self) -> &'static str {
        match self {
            RelayError::InvalidRequest(_) => "invalid_request_error",
            RelayError::UnknownModel(_) => "model_not_found",
            RelayError::BackendUnavailable | RelayError::Upstream(_) => "server_error",
        }
    }

    /// Label used for this failure in request metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            RelayError::InvalidRequest(_) => "invalid_request",
            RelayError::UnknownModel(_) => "unknown_model",
            RelayError::BackendUnavailable => "unavailable",
            RelayError::Upstream(_) => "upstream_error",
        }
    }
}

/// JSON error envelope: `{"error": {"message": ..., "type": ...}}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                error_type: error_type.into(),
            },
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = ErrorBody::new(self.to_string(), self.error_type());
        (self.status(), Json(body)).into_response()
    }
}
