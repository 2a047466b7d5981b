//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::services::rate_limiter::RateLimit;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Input Errors**: missing or conflicting feed input, wrong content type, bad URL
/// - **Authentication Errors**: invalid API keys
/// - **Admission Errors**: rate limit exhausted
/// - **Token Errors**: unknown, used or expired verification tokens
/// - **Validator Errors**: the external validator failed or left no report
/// - **Internal Errors**: database, filesystem and other unexpected failures
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem or process I/O failed outside the validator contract.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Request input is missing, conflicting or malformed.
    ///
    /// Returns HTTP 400 Bad Request. The String is shown to the caller.
    #[error("{0}")]
    InvalidInput(String),

    /// API key was presented but is unknown, inactive, or its owner is unverified.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Invalid or missing API key")]
    InvalidApiKey,

    /// Caller exhausted the budget of its tier.
    ///
    /// Returns HTTP 429 Too Many Requests with a `Retry-After` header.
    #[error("Rate limit exceeded: {limit}")]
    RateLimited { limit: RateLimit, retry_after_secs: u64 },

    /// Verification token is unknown or already used.
    #[error("Invalid or expired token.")]
    TokenInvalid,

    /// Verification token exists but is past its expiry.
    #[error("Token expired.")]
    TokenExpired,

    /// External validator exited non-zero. Carries its captured stderr.
    #[error("{0}")]
    ValidatorFailed(String),

    /// Validator succeeded but the requested report artifact is absent.
    #[error("{0}")]
    ReportMissing(&'static str),

    /// Any other unexpected failure. Details are logged, not returned.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Internal failures hide their details from the client and are logged instead.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut retry_after = None;

        let (status, code, message) = match self {
            AppError::InvalidInput(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_input", msg.clone())
            }
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::RateLimited {
                retry_after_secs, ..
            } => {
                retry_after = Some(retry_after_secs);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limited",
                    self.to_string(),
                )
            }
            AppError::TokenInvalid => (StatusCode::BAD_REQUEST, "invalid_token", self.to_string()),
            AppError::TokenExpired => (StatusCode::BAD_REQUEST, "token_expired", self.to_string()),
            AppError::ValidatorFailed(ref stderr) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "validator_execution_error",
                stderr.clone(),
            ),
            AppError::ReportMissing(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "report_missing",
                msg.to_string(),
            ),
            AppError::Database(_) | AppError::Io(_) | AppError::Internal(_) => {
                tracing::error!(error = %self, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
