//! HTTP error mapping

use crate::models::ErrorResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use fleet_common::ValidationError;
use fleet_orchestrator::LifecycleError;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Listing found nothing
    #[error("no instances found")]
    NoInstances,

    #[error("unauthorized")]
    Unauthorized,

    /// No API key configured on the server
    #[error("server error")]
    KeyNotConfigured,
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Lifecycle(LifecycleError::Validation(err))
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Lifecycle(LifecycleError::Validation(_)) => (StatusCode::BAD_REQUEST, "validation_error"),
            Self::Lifecycle(LifecycleError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Lifecycle(LifecycleError::Conflict(_)) => (StatusCode::CONFLICT, "conflict"),
            Self::Lifecycle(LifecycleError::Store(_) | LifecycleError::Internal(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
            Self::NoInstances => (StatusCode::NOT_FOUND, "not_found"),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::KeyNotConfigured => (StatusCode::INTERNAL_SERVER_ERROR, "server_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let message = match &self {
            Self::Lifecycle(LifecycleError::Store(_) | LifecycleError::Internal(_)) => "internal error".to_string(),
            other => other.to_string(),
        };

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
