//! Error types for account operations

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by account management and authentication
#[derive(Error, Debug)]
pub enum AuthError {
    /// Malformed or missing input
    #[error("{0}")]
    Validation(String),

    /// No such user
    #[error("{0} not found")]
    NotFound(String),

    /// Authenticated but not permitted
    #[error("Unauthorized")]
    Unauthorized,

    /// Missing or invalid credential
    #[error("Not authenticated")]
    Unauthenticated,

    /// Email already registered
    #[error("User with email '{0}' already exists")]
    DuplicateUser(String),

    /// Password mismatch
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Unknown IANA zone name
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Login throttled after repeated failures
    #[error("Too many failed login attempts, try again later")]
    TooManyAttempts,

    /// Infrastructure failure, details are logged not returned
    #[error("Internal server error")]
    InternalServerError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match self {
            AuthError::Validation(_) | AuthError::InvalidTimezone(_) => StatusCode::BAD_REQUEST,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Unauthorized => StatusCode::FORBIDDEN,
            AuthError::Unauthenticated | AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::DuplicateUser(_) => StatusCode::CONFLICT,
            AuthError::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
            AuthError::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::Validation(rejection.body_text())
    }
}

/// Type alias for account results
pub type AuthResult<T> = Result<T, AuthError>;
