//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (form or multipart body, query params)
//! 2. Calls into the services held by [`crate::state::AppState`]
//! 3. Returns HTTP response (JSON, HTML, status code)

/// Service health endpoint
pub mod health;

/// Email verification and API key issuance
pub mod keys;

/// Feed validation endpoint
pub mod validate;
