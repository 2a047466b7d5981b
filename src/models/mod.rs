//! Data models representing stored entities and request/response shapes.

/// API key record and resolved identity
pub mod api_key;
/// Feed submissions for validation
pub mod feed;
/// Validation report formats
pub mod report;
/// User record and email normalization
pub mod user;
/// Email verification tokens
pub mod verification_token;
