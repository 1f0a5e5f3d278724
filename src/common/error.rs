// Error handling types for the API

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::fmt;
use tracing::error;

/// API error types
///
/// The authentication taxonomy (credentials, tokens, OAuth state, providers)
/// maps to stable machine-readable codes; anything unclassified collapses to
/// a generic 500 with no internal detail in the body.
#[derive(Debug)]
pub enum ApiError {
    InvalidCredentials,
    TokenExpired,
    TokenInvalid,
    TokenNotFound,
    StateInvalid,
    UnsupportedProvider(String),
    UpstreamAuthFailure(String),
    DuplicateUsername,
    Unauthorized(String),
    BadRequest(String),
    InternalServer(String),
    DatabaseError(sqlx::Error),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::InvalidCredentials => write!(f, "Invalid username or password"),
            ApiError::TokenExpired => write!(f, "Token has expired"),
            ApiError::TokenInvalid => write!(f, "Invalid token"),
            ApiError::TokenNotFound => write!(f, "Refresh token not found"),
            ApiError::StateInvalid => write!(f, "Invalid state"),
            ApiError::UnsupportedProvider(p) => write!(f, "Unsupported provider: {}", p),
            ApiError::UpstreamAuthFailure(msg) => write!(f, "Upstream auth failure: {}", msg),
            ApiError::DuplicateUsername => write!(f, "Username already exists"),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::InternalServer(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::DatabaseError(e) => write!(f, "Database Error: {}", e),
        }
    }
}

/// JSON error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message, code) = match self {
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "invalid username or password".to_string(),
                "INVALID_CREDENTIALS",
            ),
            ApiError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "token has expired".to_string(),
                "TOKEN_EXPIRED",
            ),
            ApiError::TokenInvalid => (
                StatusCode::UNAUTHORIZED,
                "invalid token".to_string(),
                "TOKEN_INVALID",
            ),
            ApiError::TokenNotFound => (
                StatusCode::UNAUTHORIZED,
                "refresh token not found".to_string(),
                "TOKEN_NOT_FOUND",
            ),
            ApiError::StateInvalid => (
                StatusCode::UNAUTHORIZED,
                "invalid state".to_string(),
                "STATE_INVALID",
            ),
            ApiError::UnsupportedProvider(p) => (
                StatusCode::BAD_REQUEST,
                format!("unsupported provider: {}", p),
                "UNSUPPORTED_PROVIDER",
            ),
            ApiError::UpstreamAuthFailure(msg) => {
                // Provider error bodies stay in the log; the client gets a
                // stable category and a generic message.
                error!(detail = %msg, "Upstream auth failure");
                (
                    StatusCode::UNAUTHORIZED,
                    "authentication with provider failed".to_string(),
                    "UPSTREAM_AUTH_FAILURE",
                )
            }
            ApiError::DuplicateUsername => (
                StatusCode::BAD_REQUEST,
                "username already exists".to_string(),
                "DUPLICATE_USERNAME",
            ),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED"),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            ApiError::InternalServer(msg) => {
                error!(detail = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                    "INTERNAL_SERVER_ERROR",
                )
            }
            ApiError::DatabaseError(e) => {
                error!(error = %e, "Database error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database operation failed".to_string(),
                    "DATABASE_ERROR",
                )
            }
        };

        let error_response = ErrorResponse {
            error: error_message,
            code: code.to_string(),
        };

        (status, Json(error_response)).into_response()
    }
}
