//! API key issuance and verification.
//!
//! Keys are 256-bit random secrets, stored only as Argon2id hashes with a
//! random per-key salt and disclosed to their owner once.
//!
//! # Scalability
//!
//! Salted hashes cannot be looked up, so [`ApiKeyService::verify`] tests the
//! candidate against every active key: O(active keys) Argon2 verifications per
//! call. This is fine for a few hundred keys. Beyond that, store a non-secret
//! lookup index alongside each key (e.g. a keyed SHA-256 of the secret), find
//! the single row by index, and re-verify that row against the Argon2 hash.

use std::sync::Arc;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::api_key::{ApiKey, ApiKeyIdentity},
    services::generate_secret,
    store::IdentityStore,
};

/// Argon2id hasher with configurable cost.
#[derive(Debug, Clone)]
pub struct ApiKeyHasher {
    argon2: Argon2<'static>,
}

impl ApiKeyHasher {
    /// # Errors
    ///
    /// Returns `Internal` if the cost parameters are out of Argon2's range.
    pub fn new(memory_kib: u32, iterations: u32) -> Result<Self, AppError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| AppError::Internal(format!("invalid argon2 parameters: {e}")))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn hash(&self, secret: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("failed to hash api key: {e}")))
    }

    /// Constant-time check of `secret` against a PHC hash string.
    pub fn verify(&self, secret: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };

        self.argon2
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }
}

impl Default for ApiKeyHasher {
    fn default() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }
}

/// A freshly issued key. `secret` is the only copy of the plaintext.
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub secret: String,
    pub record: ApiKey,
}

#[derive(Clone)]
pub struct ApiKeyService {
    store: Arc<dyn IdentityStore>,
    hasher: Arc<ApiKeyHasher>,
}

impl ApiKeyService {
    pub fn new(store: Arc<dyn IdentityStore>, hasher: ApiKeyHasher) -> Self {
        Self {
            store,
            hasher: Arc::new(hasher),
        }
    }

    /// Issue a key for `email` and persist only its hash.
    pub async fn issue(&self, email: &str) -> Result<IssuedApiKey, AppError> {
        let secret = generate_secret();

        let hasher = self.hasher.clone();
        let to_hash = secret.clone();
        let key_hash = tokio::task::spawn_blocking(move || hasher.hash(&to_hash))
            .await
            .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))??;

        let record = ApiKey::new(email, key_hash);
        self.store.insert_api_key(&record).await?;

        tracing::info!(email, key_id = %record.id, "api key issued");
        Ok(IssuedApiKey { secret, record })
    }

    /// Resolve a candidate secret to its owner.
    ///
    /// Returns `None` unless the candidate matches an active key whose owner
    /// is verified.
    pub async fn verify(&self, candidate: &str) -> Result<Option<ApiKeyIdentity>, AppError> {
        if candidate.is_empty() {
            return Ok(None);
        }

        let keys = self.store.list_active_api_keys().await?;
        let hasher = self.hasher.clone();
        let candidate = candidate.to_string();

        // Argon2 is CPU bound; keep it off the async workers
        let matched = tokio::task::spawn_blocking(move || {
            keys.into_iter()
                .find(|key| hasher.verify(&candidate, &key.key_hash))
        })
        .await
        .map_err(|e| AppError::Internal(format!("verification task failed: {e}")))?;

        let Some(key) = matched else {
            return Ok(None);
        };

        let owner_verified = self
            .store
            .get_user(&key.owner_email)
            .await?
            .is_some_and(|user| user.is_verified);
        if !owner_verified {
            tracing::warn!(key_id = %key.id, email = %key.owner_email, "api key owner is not verified");
            return Ok(None);
        }

        Ok(Some(ApiKeyIdentity::from(&key)))
    }

    /// Revoke a key. Returns `false` if it was already inactive or unknown.
    pub async fn deactivate(&self, key_id: Uuid) -> Result<bool, AppError> {
        let deactivated = self.store.deactivate_api_key(key_id).await?;
        if deactivated {
            tracing::info!(%key_id, "api key deactivated");
        }
        Ok(deactivated)
    }
}
