//! PostgreSQL pool and migrations for the durable identity store.
//!
//! Only used when `DATABASE_URL` is set; see [`crate::store::PgIdentityStore`].

use std::time::Duration;

use sqlx::{Pool, Postgres};

pub type DbPool = Pool<Postgres>;

/// Connect to PostgreSQL.
///
/// At most 5 connections; acquiring one times out after 5 seconds.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Apply the embedded `migrations/` (users, api keys, verification tokens).
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
