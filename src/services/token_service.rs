//! Verification token lifecycle: issue and single-use consumption.
//!
//! # Lifecycle
//!
//! 1. `issue` stores a fresh token that expires `ttl` after issuance (UTC)
//! 2. `consume` looks it up, rejects it if expired or used, then flips
//!    `is_used` with a conditional store update
//! 3. The owner is marked verified
//!
//! Issuing a new token leaves earlier outstanding tokens for the same email
//! valid until they are used or expire.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    error::AppError,
    models::verification_token::{VerificationToken, fingerprint},
    services::generate_secret,
    store::IdentityStore,
};

#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn IdentityStore>,
    ttl: Duration,
}

impl TokenService {
    pub fn new(store: Arc<dyn IdentityStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Issue a token for an already normalized email.
    pub async fn issue(&self, email: &str) -> Result<VerificationToken, AppError> {
        let token = VerificationToken::new(email, generate_secret(), self.ttl);
        self.store.insert_token(&token).await?;

        tracing::info!(
            email,
            token = %fingerprint(&token.token_value),
            expires_at = %token.expires_at,
            "verification token issued"
        );
        Ok(token)
    }

    /// Consume a token and return the owner's email.
    ///
    /// # Errors
    ///
    /// - `TokenExpired`: token found but past `expires_at` (whether used or not)
    /// - `TokenInvalid`: unknown value, already used, or another request consumed it first
    pub async fn consume(&self, token_value: &str) -> Result<String, AppError> {
        let fp = fingerprint(token_value);

        let token = self
            .store
            .find_token_by_value(token_value)
            .await?
            .ok_or_else(|| {
                tracing::warn!(token = %fp, "unknown verification token");
                AppError::TokenInvalid
            })?;

        let now = Utc::now();
        if token.is_expired_at(now) {
            tracing::warn!(token = %fp, email = %token.owner_email, "expired verification token");
            return Err(AppError::TokenExpired);
        }

        if !token.is_consumable_at(now) || !self.store.mark_token_used(token_value).await? {
            tracing::warn!(token = %fp, email = %token.owner_email, "verification token already used");
            return Err(AppError::TokenInvalid);
        }

        self.store.set_user_verified(&token.owner_email).await?;
        tracing::info!(token = %fp, email = %token.owner_email, "email verified");

        Ok(token.owner_email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryIdentityStore;

    fn service(store: Arc<InMemoryIdentityStore>, ttl: Duration) -> TokenService {
        TokenService::new(store, ttl)
    }

    #[tokio::test]
    async fn issue_sets_expiry_from_ttl() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let tokens = service(store.clone(), Duration::hours(24));

        let token = tokens.issue("a@example.com").await.unwrap();

        assert_eq!(token.expires_at - token.created_at, Duration::hours(24));
        assert!(!token.is_used);
        assert_eq!(store.tokens_for("a@example.com").await.len(), 1);
    }

    #[tokio::test]
    async fn consume_verifies_owner_once() {
        let store = Arc::new(InMemoryIdentityStore::new());
        store.get_or_create_user("a@example.com").await.unwrap();
        let tokens = service(store.clone(), Duration::hours(24));
        let token = tokens.issue("a@example.com").await.unwrap();

        let email = tokens.consume(&token.token_value).await.unwrap();
        assert_eq!(email, "a@example.com");
        assert!(store.get_user("a@example.com").await.unwrap().unwrap().is_verified);

        let second = tokens.consume(&token.token_value).await;
        assert!(matches!(second, Err(AppError::TokenInvalid)));
    }

    #[tokio::test]
    async fn unknown_token_is_invalid() {
        let tokens = service(Arc::new(InMemoryIdentityStore::new()), Duration::hours(24));

        assert!(matches!(
            tokens.consume("does-not-exist").await,
            Err(AppError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn expired_token_fails_even_if_used() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let tokens = service(store.clone(), Duration::hours(24));

        let mut expired =
            VerificationToken::new("a@example.com", generate_secret(), Duration::hours(24));
        expired.expires_at = Utc::now() - Duration::seconds(1);
        store.insert_token(&expired).await.unwrap();
        assert!(matches!(
            tokens.consume(&expired.token_value).await,
            Err(AppError::TokenExpired)
        ));

        let mut used = VerificationToken::new("a@example.com", generate_secret(), Duration::hours(24));
        used.expires_at = Utc::now() - Duration::seconds(1);
        used.is_used = true;
        store.insert_token(&used).await.unwrap();
        assert!(matches!(
            tokens.consume(&used.token_value).await,
            Err(AppError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn used_token_is_invalid_before_expiry() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let tokens = service(store.clone(), Duration::hours(24));

        let mut used = VerificationToken::new("a@example.com", generate_secret(), Duration::hours(24));
        used.is_used = true;
        store.insert_token(&used).await.unwrap();

        assert!(matches!(
            tokens.consume(&used.token_value).await,
            Err(AppError::TokenInvalid)
        ));
        assert!(store.get_user("a@example.com").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumption_has_one_winner() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let tokens = service(store.clone(), Duration::hours(24));
        let token = tokens.issue("a@example.com").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let tokens = tokens.clone();
            let value = token.token_value.clone();
            handles.push(tokio::spawn(async move { tokens.consume(&value).await }));
        }

        let mut successes = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AppError::TokenInvalid) => {}
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn reissue_keeps_earlier_token_valid() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let tokens = service(store.clone(), Duration::hours(24));

        let first = tokens.issue("a@example.com").await.unwrap();
        let second = tokens.issue("a@example.com").await.unwrap();
        assert_ne!(first.token_value, second.token_value);

        assert!(tokens.consume(&first.token_value).await.is_ok());
        assert!(tokens.consume(&second.token_value).await.is_ok());
    }
}
