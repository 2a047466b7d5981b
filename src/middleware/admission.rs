//! Admission middleware for `POST /validate`.
//!
//! This middleware intercepts every validation request to:
//! 1. Resolve the caller's API key, if one was sent
//! 2. Classify the caller into a rate tier
//! 3. Count the request against the caller's budget
//! 4. Inject a [`CallerContext`] into the request
//!
//! In trusted-deployment mode (`DISABLE_EMAIL_AND_API_KEY`) steps 1-3 are skipped.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};

use crate::{
    error::AppError,
    models::api_key::ApiKeyIdentity,
    services::admission::{CallerKey, Tier},
    state::AppState,
};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Who is calling, attached to admitted requests.
#[derive(Debug, Clone)]
pub struct CallerContext {
    /// Peer IP address, or `unknown` when the server runs without connect info
    pub origin: String,

    /// Present when a valid API key was sent
    pub identity: Option<ApiKeyIdentity>,

    /// `None` in trusted-deployment mode
    pub tier: Option<Tier>,
}

/// Read the API key from `X-API-Key`, falling back to `Authorization: Bearer`.
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    let from_header = headers
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim);

    let from_bearer = || {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
    };

    from_header
        .filter(|k| !k.is_empty())
        .or_else(|| from_bearer().filter(|k| !k.is_empty()))
        .map(str::to_string)
}

fn origin(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Admission middleware function.
///
/// # Flow
///
/// - No key → Unauthenticated tier, counted by origin
/// - Valid key → Authenticated tier, counted by key id
/// - Key that does not verify → 401, counted against the origin's
///   unauthenticated budget
/// - Budget spent → 429 with `Retry-After`; once rejected keys from an
///   origin have spent it, further keys from there are refused unverified
pub async fn admission_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let origin = origin(&request);

    if state.admission.is_bypassed() {
        tracing::debug!(%origin, "identity and rate limiting disabled");
        request.extensions_mut().insert(CallerContext {
            origin,
            identity: None,
            tier: None,
        });
        return Ok(next.run(request).await);
    }

    let identity = match extract_api_key(request.headers()) {
        Some(candidate) => {
            state.admission.check_key_attempt(&origin).await?;

            let identity = state.api_keys.verify(&candidate).await?;
            if identity.is_none() {
                tracing::warn!(%origin, "rejected invalid api key");
                state.admission.record_rejected_key(&origin).await?;
                return Err(AppError::InvalidApiKey);
            }
            identity
        }
        None => None,
    };

    let tier = state.admission.classify(identity.is_some());
    let caller = match &identity {
        Some(identity) => CallerKey::ApiKey(identity.key_id),
        None => CallerKey::Origin(origin.clone()),
    };
    state.admission.enforce(tier, &caller).await?;

    request.extensions_mut().insert(CallerContext {
        origin,
        identity,
        tier: Some(tier),
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn prefers_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("primary"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secondary"));

        assert_eq!(extract_api_key(&headers).as_deref(), Some("primary"));
    }

    #[test]
    fn falls_back_to_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("  "));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secondary"));

        assert_eq!(extract_api_key(&headers).as_deref(), Some("secondary"));
    }

    #[test]
    fn absent_without_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_api_key(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_api_key(&headers), None);
    }
}
