//! Database module providing PostgreSQL connection pooling and utilities.
//!
//! This module manages the sqlx connection pool, the optional Redis pool for
//! rate-limit counters, the user and session repositories, and the
//! row-level-security context helpers.

use deadpool_redis::{Config as RedisConfig, Pool as RedisPool, Runtime};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

pub mod config;
pub mod repository;
pub mod rls;
pub mod timeouts;

pub use config::DatabaseConfig;
pub use repository::{
    InMemorySessionRepository, InMemoryUserRepository, PgSessionRepository, PgUserRepository,
    SessionRepository, UserRepository,
};

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use daira_auth::db::{Database, DatabaseConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), sqlx::Error> {
    ///     let config = DatabaseConfig::from_env();
    ///     let db = Database::new(&config).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        info!(url = %config.database_url_masked(), "Connecting to PostgreSQL");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Check if the database connection is healthy
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Build a Redis pool for the shared counter store.
///
/// Pool creation does not connect; the first command does.
pub fn create_redis_pool(redis_url: &str) -> Result<RedisPool, String> {
    info!(url = %config::mask_url(redis_url), "Creating Redis pool");

    RedisConfig::from_url(redis_url)
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| format!("Redis: {}", e))
}
