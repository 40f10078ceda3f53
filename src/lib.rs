pub mod api;
pub mod batching;
pub mod config;
pub mod jobs;
pub mod models;
pub mod queue;
pub mod retry;
pub mod security;
pub mod store;
pub mod translation;

use anyhow::{Context, Result};
use config::Config;
use retry::{with_retry, RetryConfig};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect to Postgres when any configured component needs it
pub async fn connect_database(config: &Config) -> Result<Option<PgPool>> {
    if !config.requires_database() {
        return Ok(None);
    }
    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL not set")?;

    let pool = with_retry(&RetryConfig::database_connect(), "Database connection", || {
        PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .connect(url)
    })
    .await
    .context("Failed to connect to database")?;

    Ok(Some(pool))
}
