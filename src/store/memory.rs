//! Process-local identity store.
//!
//! Used when no `DATABASE_URL` is configured and throughout the test suite.
//! Each collection sits behind its own `RwLock`; conditional updates happen
//! under the write lock.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::IdentityStore;
use crate::{
    error::AppError,
    models::{api_key::ApiKey, user::User, verification_token::VerificationToken},
};

#[derive(Debug, Default)]
pub struct InMemoryIdentityStore {
    users: RwLock<HashMap<String, User>>,
    /// Keyed by token value.
    tokens: RwLock<HashMap<String, VerificationToken>>,
    api_keys: RwLock<HashMap<Uuid, ApiKey>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn api_key_count(&self) -> usize {
        self.api_keys.read().await.len()
    }

    pub async fn tokens_for(&self, email: &str) -> Vec<VerificationToken> {
        self.tokens
            .read()
            .await
            .values()
            .filter(|t| t.owner_email == email)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn get_user(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn get_or_create_user(&self, email: &str) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        let user = users
            .entry(email.to_string())
            .or_insert_with(|| User::new(email, false));
        Ok(user.clone())
    }

    async fn set_user_verified(&self, email: &str) -> Result<(), AppError> {
        let mut users = self.users.write().await;
        users
            .entry(email.to_string())
            .or_insert_with(|| User::new(email, true))
            .is_verified = true;
        Ok(())
    }

    async fn insert_token(&self, token: &VerificationToken) -> Result<(), AppError> {
        let mut tokens = self.tokens.write().await;
        if tokens.contains_key(&token.token_value) {
            return Err(AppError::Internal("duplicate token value".to_string()));
        }
        tokens.insert(token.token_value.clone(), token.clone());
        Ok(())
    }

    async fn find_token_by_value(
        &self,
        token_value: &str,
    ) -> Result<Option<VerificationToken>, AppError> {
        Ok(self.tokens.read().await.get(token_value).cloned())
    }

    async fn mark_token_used(&self, token_value: &str) -> Result<bool, AppError> {
        let mut tokens = self.tokens.write().await;
        match tokens.get_mut(token_value) {
            Some(token) if !token.is_used => {
                token.is_used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_api_key(&self, key: &ApiKey) -> Result<(), AppError> {
        self.api_keys.write().await.insert(key.id, key.clone());
        Ok(())
    }

    async fn list_active_api_keys(&self) -> Result<Vec<ApiKey>, AppError> {
        Ok(self
            .api_keys
            .read()
            .await
            .values()
            .filter(|k| k.is_active)
            .cloned()
            .collect())
    }

    async fn deactivate_api_key(&self, key_id: Uuid) -> Result<bool, AppError> {
        let mut keys = self.api_keys.write().await;
        match keys.get_mut(&key_id) {
            Some(key) if key.is_active => {
                key.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}
