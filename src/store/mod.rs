//! Identity store: durable users, API keys and verification tokens.
//!
//! Services depend on the [`IdentityStore`] trait, never on a concrete
//! backend. Every method is atomic per record; [`IdentityStore::mark_token_used`]
//! is the conditional update that keeps token consumption race-safe.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{api_key::ApiKey, user::User, verification_token::VerificationToken},
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryIdentityStore;
pub use postgres::PgIdentityStore;

/// Storage contract for identity records.
///
/// Emails passed in are already normalized (see [`crate::models::user::normalize_email`]).
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_user(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Return the existing user or create an unverified one. Never duplicates.
    async fn get_or_create_user(&self, email: &str) -> Result<User, AppError>;

    async fn set_user_verified(&self, email: &str) -> Result<(), AppError>;

    async fn insert_token(&self, token: &VerificationToken) -> Result<(), AppError>;

    /// Point lookup by token value.
    async fn find_token_by_value(
        &self,
        token_value: &str,
    ) -> Result<Option<VerificationToken>, AppError>;

    /// Flip `is_used` from false to true, addressed by the indexed token
    /// value. Returns `false` if the token was already used (or does not
    /// exist), so exactly one caller wins a race.
    async fn mark_token_used(&self, token_value: &str) -> Result<bool, AppError>;

    async fn insert_api_key(&self, key: &ApiKey) -> Result<(), AppError>;

    /// All keys with `is_active = true`.
    async fn list_active_api_keys(&self) -> Result<Vec<ApiKey>, AppError>;

    /// Flip `is_active` to false. Returns `false` if the key was not active.
    async fn deactivate_api_key(&self, key_id: Uuid) -> Result<bool, AppError>;

    /// Connectivity check for `/health`.
    async fn ping(&self) -> Result<(), AppError>;
}
