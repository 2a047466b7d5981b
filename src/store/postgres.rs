//! PostgreSQL identity store.
//!
//! # Scalability
//!
//! Token consumption is a point lookup on the unique `token_value` index.
//! API key verification loads every active key because salted hashes cannot
//! be indexed; see [`crate::services::api_key_service`].

use async_trait::async_trait;
use uuid::Uuid;

use super::IdentityStore;
use crate::{
    db::DbPool,
    error::AppError,
    models::{api_key::ApiKey, user::User, verification_token::VerificationToken},
};

#[derive(Debug, Clone)]
pub struct PgIdentityStore {
    pool: DbPool,
}

impl PgIdentityStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn get_user(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT email, is_verified, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_or_create_user(&self, email: &str) -> Result<User, AppError> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, is_verified)
            VALUES ($1, false)
            ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
            RETURNING email, is_verified, created_at
            "#,
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn set_user_verified(&self, email: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO users (email, is_verified)
            VALUES ($1, true)
            ON CONFLICT (email) DO UPDATE SET is_verified = true
            "#,
        )
        .bind(email)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_token(&self, token: &VerificationToken) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO verification_tokens (id, owner_email, token_value, created_at, expires_at, is_used)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(token.id)
        .bind(&token.owner_email)
        .bind(&token.token_value)
        .bind(token.created_at)
        .bind(token.expires_at)
        .bind(token.is_used)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_token_by_value(
        &self,
        token_value: &str,
    ) -> Result<Option<VerificationToken>, AppError> {
        let token = sqlx::query_as::<_, VerificationToken>(
            r#"
            SELECT id, owner_email, token_value, created_at, expires_at, is_used
            FROM verification_tokens
            WHERE token_value = $1
            "#,
        )
        .bind(token_value)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token)
    }

    async fn mark_token_used(&self, token_value: &str) -> Result<bool, AppError> {
        // Conditional on is_used = false: only one concurrent caller affects the row
        let updated = sqlx::query(
            "UPDATE verification_tokens SET is_used = true WHERE token_value = $1 AND is_used = false",
        )
        .bind(token_value)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }

    async fn insert_api_key(&self, key: &ApiKey) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO api_keys (id, owner_email, key_hash, created_at, is_active)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(key.id)
        .bind(&key.owner_email)
        .bind(&key.key_hash)
        .bind(key.created_at)
        .bind(key.is_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_active_api_keys(&self) -> Result<Vec<ApiKey>, AppError> {
        let keys = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT id, owner_email, key_hash, created_at, is_active
            FROM api_keys
            WHERE is_active = true
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn deactivate_api_key(&self, key_id: Uuid) -> Result<bool, AppError> {
        let updated = sqlx::query(
            "UPDATE api_keys SET is_active = false WHERE id = $1 AND is_active = true",
        )
        .bind(key_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated == 1)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
