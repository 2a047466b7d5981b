//! API Key model for authentication.
//!
//! API keys authenticate callers of the validation endpoint. Only an Argon2id
//! hash of each key is stored; the plaintext is shown to its owner exactly once.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Represents an API key record.
///
/// # Database Table
///
/// Maps to the `api_keys` table with columns:
/// - `id`: Unique identifier (UUID)
/// - `owner_email`: Lowercased email of the owning user
/// - `key_hash`: Argon2id PHC string of the secret
/// - `created_at`: When the key was issued
/// - `is_active`: Whether the key is currently valid
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,

    pub owner_email: String,

    /// Argon2id hash in PHC format, salt included.
    ///
    /// Because the salt is random per key the hash cannot be looked up
    /// directly; verification tests a candidate against every active hash.
    pub key_hash: String,

    pub created_at: DateTime<Utc>,

    /// Inactive keys are never loaded for verification. This provides a way
    /// to revoke access without deleting the record.
    pub is_active: bool,
}

impl ApiKey {
    pub fn new(owner_email: impl Into<String>, key_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_email: owner_email.into(),
            key_hash,
            created_at: Utc::now(),
            is_active: true,
        }
    }
}

/// Identity resolved from a verified API key.
///
/// Inserted into request extensions by the admission middleware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiKeyIdentity {
    pub key_id: Uuid,
    pub owner_email: String,
}

impl From<&ApiKey> for ApiKeyIdentity {
    fn from(key: &ApiKey) -> Self {
        Self {
            key_id: key.id,
            owner_email: key.owner_email.clone(),
        }
    }
}
