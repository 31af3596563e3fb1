//! HTTP API for the authentication service.
//!
//! # Endpoints
//!
//! ```text
//! GET  /health                    - Health check (public)
//! POST /api/v1/auth/register      - Register user, 201 (public)
//! POST /api/v1/auth/login         - Login (public)
//! POST /api/v1/auth/refresh       - Rotate refresh token (public, token in body)
//! POST /api/v1/auth/logout        - Revoke session (auth required)
//! GET  /api/v1/auth/me            - Current profile (auth required)
//! GET  /api/v1/auth/whoami        - Current profile or anonymous (auth optional)
//! ```
//!
//! Errors are JSON `{"error": code, "message": text, "retry_after": secs}`;
//! `retry_after` only appears on `429` responses, which also carry a
//! `Retry-After` header.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use daira_server::api::{create_router, AppState};
//! # use daira_auth::AuthManager;
//! # async fn example(auth_manager: AuthManager) -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::new(auth_manager, None);
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! CORS is permissive; put the service behind a proxy that restricts origins
//! in production.

pub mod auth;
pub mod client;
pub mod error;
pub mod middleware;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use daira_auth::{AuthManager, db::Database};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth_manager: Arc<AuthManager>,
    /// Probed by `/health`; `None` when the stores are in-process
    pub database: Option<Database>,
    /// Take the caller address from `X-Forwarded-For` instead of the peer
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(auth_manager: AuthManager, database: Option<Database>) -> Self {
        Self {
            auth_manager: Arc::new(auth_manager),
            database,
            trust_forwarded_for: false,
        }
    }

    pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }
}

/// Create the API router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", create_v1_router(state.clone()))
        .layer(axum::middleware::from_fn(middleware::log_requests))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn create_v1_router(state: AppState) -> Router<AppState> {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh_token))
        .route("/auth/whoami", get(auth::whoami));

    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::me))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth_middleware,
        ));

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Health check for monitoring and load balancers.
///
/// Returns `200 OK` when the database answers (or none is configured) and
/// `503 Service Unavailable` otherwise.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.database {
        Some(db) => Some(db.health_check().await.is_ok()),
        None => None,
    };
    let healthy = database.unwrap_or(true);

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
