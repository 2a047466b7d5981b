//! GTFS Validator API - Main Application Entry Point
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Identity Store**: PostgreSQL with sqlx, or in-memory when `DATABASE_URL` is unset
//! - **Authentication**: optional API key, Argon2id hashed at rest
//! - **Validation**: external validator process per request, isolated workspace
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Initialize logging (JSON in production)
//! 3. Connect the identity store and run migrations
//! 4. Start the notification worker and the limiter sweep
//! 5. Start server on configured port

use std::{net::SocketAddr, sync::Arc, time::Duration};

use gtfs_validator_api::{
    config::{AppEnv, Config},
    db, routes,
    state::AppState,
    store::{IdentityStore, InMemoryIdentityStore, PgIdentityStore},
};
use tracing_subscriber::EnvFilter;

const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

fn init_tracing(app_env: AppEnv) {
    // Reads RUST_LOG environment variable (defaults to "info" level)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if app_env == AppEnv::Production {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.app_env);
    tracing::info!(app_env = ?config.app_env, "Configuration loaded");

    if config.disable_email_and_api_key {
        tracing::warn!("DISABLE_EMAIL_AND_API_KEY is set, identity and rate limiting are off");
    }

    let store: Arc<dyn IdentityStore> = match &config.database_url {
        Some(database_url) => {
            let pool = db::create_pool(database_url).await?;
            tracing::info!("Database pool created");

            db::run_migrations(&pool).await?;
            tracing::info!("Database migrations complete");

            Arc::new(PgIdentityStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, identities are kept in memory only");
            Arc::new(InMemoryIdentityStore::new())
        }
    };

    let port = config.server_port;
    let (state, _notification_worker) = AppState::from_config(config, store)?;

    let admission = state.admission.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            admission.sweep().await;
        }
    });

    let app = routes::router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
