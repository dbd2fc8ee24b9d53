#![allow(dead_code)]
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::error::ControlError;

/// API error types that can be returned from handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("internal error: {0}")]
    InternalError(String),
}

/// Error response that gets serialized to JSON
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Control(e) if e.is_fatal() => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Control(_) => StatusCode::BAD_GATEWAY,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::Unauthorized => "Unauthorized",
            ApiError::Control(_) => "ControlError",
            ApiError::InternalError(_) => "InternalServerError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        match &self {
            ApiError::InternalError(_) => tracing::error!(error = %self, "API error occurred"),
            ApiError::Control(e) if e.is_fatal() => tracing::error!(error = %e, "fatal control error"),
            ApiError::Control(_) => tracing::warn!(error = %self, "control error"),
            _ => tracing::debug!(error = %self, "client error"),
        }

        let error_response = ErrorResponse { error: error_type.to_string(), message: self.to_string() };
        (status, Json(error_response)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::InternalError(error.to_string())
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::ValidationError(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ApiError::BadRequest("test".to_string()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::InternalError("test".to_string()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn fatal_control_error_maps_to_service_unavailable() {
        let e = ApiError::Control(ControlError::Outage {
            operation: "read".into(),
            elapsed: std::time::Duration::from_secs(2000),
        });
        assert_eq!(e.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn non_fatal_control_error_maps_to_bad_gateway() {
        let e = ApiError::Control(ControlError::ShortHorizon { provider: "solar".into(), got: 3, needed: 18 });
        assert_eq!(e.status_code(), StatusCode::BAD_GATEWAY);
    }
}
