//! Custom error types for the API service

use auth::AuthError;
use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use media::MediaError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::time::TimeError;

/// Custom error type for the API service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Malformed or missing input
    #[error("{0}")]
    Validation(String),

    /// Referenced record does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Caller is authenticated but not allowed to act on the record
    #[error("Unauthorized")]
    Unauthorized,

    /// Missing or invalid credential
    #[error("Not authenticated")]
    Unauthenticated,

    /// Resolved start instant is not in the future
    #[error("Appointment date must be in the future")]
    PastDate,

    /// Mutation attempted on a canceled appointment
    #[error("Appointment is already canceled")]
    AlreadyCanceled,

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("File upload failed: {0}")]
    UploadFailed(String),

    /// Infrastructure failure, details are logged not returned
    #[error("Internal server error")]
    InternalServerError,

    /// Account and authentication failures
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl ApiError {
    /// Log an infrastructure failure and replace it with the generic error
    pub fn internal(context: &'static str) -> impl FnOnce(anyhow::Error) -> ApiError {
        move |e| {
            error!("{}: {:#}", context, e);
            ApiError::InternalServerError
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::UnsupportedFileType(name) => ApiError::UnsupportedFileType(name),
            MediaError::UploadFailed(name) => ApiError::UploadFailed(name),
        }
    }
}

impl From<TimeError> for ApiError {
    fn from(e: TimeError) -> Self {
        ApiError::Validation(e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Validation(_) | ApiError::PastDate => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::FORBIDDEN,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::AlreadyCanceled => StatusCode::CONFLICT,
            ApiError::UnsupportedFileType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::UploadFailed(_) => StatusCode::BAD_GATEWAY,
            ApiError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Auth(inner) => return inner.into_response(),
        };

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
