//! Shared application state.
//!
//! Every service is constructed once at startup and handed to handlers
//! through axum's `State` extractor; nothing lives in a global.

use std::sync::Arc;

use chrono::Duration;
use tokio::task::JoinHandle;

use crate::{
    config::Config,
    services::{
        admission::AdmissionController,
        api_key_service::{ApiKeyHasher, ApiKeyService},
        notification_service::{HttpMailer, LogMailer, Mailer, NotificationDispatcher},
        token_service::TokenService,
        validation_service::{CommandValidator, ValidationOrchestrator},
    },
    store::IdentityStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn IdentityStore>,
    pub tokens: TokenService,
    pub api_keys: ApiKeyService,
    pub admission: Arc<AdmissionController>,
    pub validation: Arc<ValidationOrchestrator>,
    pub notifications: NotificationDispatcher,
}

impl AppState {
    /// Assemble state from already constructed collaborators.
    pub fn new(
        config: Config,
        store: Arc<dyn IdentityStore>,
        hasher: ApiKeyHasher,
        validation: ValidationOrchestrator,
        notifications: NotificationDispatcher,
    ) -> Self {
        let admission = AdmissionController::new(
            config.unauth_limit,
            config.auth_limit,
            config.disable_email_and_api_key,
        );

        Self {
            tokens: TokenService::new(store.clone(), Duration::hours(config.token_ttl_hours)),
            api_keys: ApiKeyService::new(store.clone(), hasher),
            admission: Arc::new(admission),
            validation: Arc::new(validation),
            notifications,
            store,
            config: Arc::new(config),
        }
    }

    /// Build the production wiring from configuration.
    ///
    /// Returns the state and the notification worker handle.
    pub fn from_config(
        config: Config,
        store: Arc<dyn IdentityStore>,
    ) -> anyhow::Result<(Self, JoinHandle<()>)> {
        let hasher = ApiKeyHasher::new(config.argon2_memory_kib, config.argon2_iterations)?;

        let validator = CommandValidator::new(config.validator_program.clone(), config.validator_args());
        let validation = ValidationOrchestrator::new(
            Arc::new(validator),
            config.max_feed_bytes,
            std::time::Duration::from_secs(config.download_timeout_secs),
        )?;

        let mailer: Arc<dyn Mailer> = match config.mail_credentials() {
            Some(credentials) => Arc::new(HttpMailer::new(config.mail_api_url.clone(), credentials)?),
            None => {
                tracing::warn!("mail credentials not configured, verification links will only be logged");
                Arc::new(LogMailer)
            }
        };
        let (notifications, worker) = NotificationDispatcher::spawn(
            mailer,
            config.base_url.clone(),
            config.notification_queue_capacity,
        );

        Ok((Self::new(config, store, hasher, validation, notifications), worker))
    }
}
