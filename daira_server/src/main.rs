//! Authentication server.
//!
//! Serves the auth API over PostgreSQL-backed users and sessions, with rate
//! limit counters in Redis when `REDIS_URL` is set.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use daira_auth::{
    AuthManager,
    clock::{Clock, SystemClock},
    db::{Database, PgSessionRepository, PgUserRepository, create_redis_pool},
    security::{CounterStore, InMemoryCounterStore, RedisCounterStore},
};
use daira_server::{
    api::{self, AppState},
    config::ServerConfig,
    logging,
};
use pico_args::Arguments;
use tracing::{error, info, warn};

const HELP: &str = "\
Run the daira authentication server

USAGE:
  daira_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:6969]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string (required unless --db-url)
  REDIS_URL                Redis for shared rate-limit counters (optional)
  JWT_SECRET               JWT signing secret, at least 32 characters
  PASSWORD_PEPPER          Password hashing pepper, at least 16 characters
  FINGERPRINT_POLICY       advisory | required  [default: advisory]
  AUTH_IO_TIMEOUT_MS       Per-call store timeout in milliseconds
  TRUST_FORWARDED_FOR      true behind a proxy that sets X-Forwarded-For  [default: false]
  (See .env file for all configuration options)
";

/// Expired sessions are swept at this interval
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let database_url: Option<String> = pargs.opt_value_from_str("--db-url")?;

    logging::init();

    let config = ServerConfig::from_env(bind, database_url)?;
    info!(bind = %config.bind, auth = ?config.auth, "Starting authentication server");

    let db = Database::new(&config.database)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to database {}",
                config.database.database_url_masked()
            )
        })?;
    db.migrate().await.context("Failed to run migrations")?;
    info!("Database connected and migrated");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let counters: Arc<dyn CounterStore> = match &config.database.redis_url {
        Some(url) => {
            let pool = create_redis_pool(url).map_err(Error::msg)?;
            Arc::new(RedisCounterStore::new(pool))
        }
        None => {
            warn!("REDIS_URL not set; rate limits are per process");
            Arc::new(InMemoryCounterStore::new(clock.clone()))
        }
    };

    let auth_manager = AuthManager::new(
        config.auth.clone(),
        config.password_pepper.clone(),
        Arc::new(PgUserRepository::new(db.pool().clone())),
        Arc::new(PgSessionRepository::new(db.pool().clone())),
        counters,
        clock,
    );

    spawn_session_purge(auth_manager.clone());

    let state = AppState::new(auth_manager, Some(db.clone()))
        .with_trust_forwarded_for(config.trust_forwarded_for);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    info!("Shutting down server...");
    db.close().await;

    Ok(())
}

fn spawn_session_purge(auth_manager: AuthManager) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match auth_manager.purge_expired_sessions().await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "Purged expired sessions"),
                Err(e) => error!(error = %e, "Session purge failed"),
            }
        }
    });
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}
