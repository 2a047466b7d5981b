//! Onboarding endpoints: request a verification link, redeem it for an API key.

use axum::{
    Form, Json,
    extract::{FromRequest, Query, Request, State},
    http::header,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{user::normalize_email, verification_token::fingerprint},
    state::AppState,
};

pub const MSG_CHECK_EMAIL: &str = "Check your email for a verification link.";
pub const MSG_CHECKS_DISABLED: &str = "Email verification is disabled; no API key is required.";
pub const MSG_VERIFIED: &str = "Email verified!";

/// Body of `POST /request-key`, sent as a form or as JSON.
#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub email: String,
}

impl<S> FromRequest<S> for KeyRequest
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/json"));

        if is_json {
            let Json(body) = Json::<KeyRequest>::from_request(req, state)
                .await
                .map_err(|e| AppError::InvalidInput(e.body_text()))?;
            Ok(body)
        } else {
            let Form(body) = Form::<KeyRequest>::from_request(req, state)
                .await
                .map_err(|e| AppError::InvalidInput(e.body_text()))?;
            Ok(body)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct VerifiedResponse {
    pub message: String,
    pub email: String,
    pub api_key: String,
    pub key_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: Option<String>,
}

/// Start onboarding for an email address.
///
/// # Response (200 OK)
///
/// ```json
/// { "message": "Check your email for a verification link." }
/// ```
///
/// Repeat calls for the same address issue a fresh token and send another
/// email. Mail delivery happens after the response; its failures are logged only.
///
/// # Errors
///
/// - 400 if the email is missing or malformed
pub async fn request_key(
    State(state): State<AppState>,
    request: KeyRequest,
) -> Result<Json<MessageResponse>, AppError> {
    let email = normalize_email(&request.email)?;
    tracing::info!(%email, "api key requested");

    let user = state.store.get_or_create_user(&email).await.inspect_err(|e| {
        tracing::error!(%email, error = %e, "failed to load or create user");
    })?;

    if state.config.disable_email_and_api_key {
        if !user.is_verified {
            state.store.set_user_verified(&email).await?;
        }
        return Ok(Json(MessageResponse {
            message: MSG_CHECKS_DISABLED.to_string(),
        }));
    }

    let token = state.tokens.issue(&email).await.inspect_err(|e| {
        tracing::error!(%email, error = %e, "failed to issue verification token");
    })?;
    state.notifications.schedule(&email, &token);

    Ok(Json(MessageResponse {
        message: MSG_CHECK_EMAIL.to_string(),
    }))
}

/// Redeem a verification token for a new API key.
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "message": "Email verified!",
///   "email": "someone@example.com",
///   "api_key": "R2Vu...",
///   "key_id": "550e8400-e29b-41d4-a716-446655440000"
/// }
/// ```
///
/// The plaintext key appears in this response only.
///
/// # Errors
///
/// - 400 `invalid_token` if the token is unknown or already used
/// - 400 `token_expired` if the token is past its expiry
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Json<VerifiedResponse>, AppError> {
    let token = query
        .token
        .filter(|t| !t.trim().is_empty())
        .ok_or(AppError::TokenInvalid)?;

    let email = state.tokens.consume(&token).await?;

    let issued = state.api_keys.issue(&email).await.inspect_err(|e| {
        tracing::error!(
            %email,
            token = %fingerprint(&token),
            error = %e,
            "token consumed but api key issuance failed"
        );
    })?;

    Ok(Json(VerifiedResponse {
        message: MSG_VERIFIED.to_string(),
        email,
        api_key: issued.secret,
        key_id: issued.record.id,
    }))
}
