//! Business logic services.
//!
//! Services contain the core logic separated from HTTP handlers. Each is an
//! explicitly constructed object held in [`crate::state::AppState`].

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

pub mod admission;
pub mod api_key_service;
pub mod notification_service;
pub mod rate_limiter;
pub mod token_service;
pub mod validation_service;

/// Generate a cryptographically secure, URL-safe random secret.
///
/// # Output
///
/// 43 characters of unpadded URL-safe base64 (32 random bytes, 256 bits)
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}
