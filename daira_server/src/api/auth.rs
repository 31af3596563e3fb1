//! Authentication API handlers.
//!
//! Thin HTTP wrappers over [`daira_auth::AuthManager`]. Caller address, user
//! agent, device fingerprint and bearer token come from [`ClientInfo`].
//!
//! # Examples
//!
//! Register a new user:
//! ```bash
//! curl -X POST http://localhost:6969/api/v1/auth/register \
//!   -H "Content-Type: application/json" \
//!   -H "X-Device-Fingerprint: laptop-1" \
//!   -d '{"username": "player1", "email": "p1@example.com", "password": "Pass1234"}'
//! ```
//!
//! Login:
//! ```bash
//! curl -X POST http://localhost:6969/api/v1/auth/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "p1@example.com", "password": "Pass1234"}'
//! ```

use axum::{Json, extract::State, http::StatusCode};
use daira_auth::auth::{AuthError, LoginRequest, PublicProfile, RegisterRequest, TokenPair};
use serde::{Deserialize, Serialize};

use super::{AppState, client::ClientInfo, error::ApiError};
use crate::logging::log_security_event;

#[derive(Debug, Deserialize)]
pub struct RegisterPayload {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub device_fingerprint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
    pub device_fingerprint: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshPayload {
    pub refresh_token: String,
    pub device_fingerprint: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub authenticated: bool,
    pub user: Option<PublicProfile>,
}

/// Register a new user account and start its first session.
///
/// Returns `201 Created` with a token pair. Duplicate email or username
/// answers `409 Conflict`.
pub async fn register(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<TokenPair>), ApiError> {
    let request = RegisterRequest {
        username: payload.username,
        email: payload.email,
        password: payload.password,
        display_name: payload.display_name,
        device_fingerprint: fingerprint(payload.device_fingerprint, &client),
    };

    let tokens = state
        .auth_manager
        .register(request, &client.context)
        .await
        .inspect_err(|e| note_throttle(e, "register", &client))?;

    Ok((StatusCode::CREATED, Json(tokens)))
}

/// Authenticate with email and password.
///
/// Unknown email and wrong password give the same `401` response.
pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(payload): Json<LoginPayload>,
) -> Result<Json<TokenPair>, ApiError> {
    let request = LoginRequest {
        email: payload.email,
        password: payload.password,
        device_fingerprint: fingerprint(payload.device_fingerprint, &client),
    };

    let tokens = state
        .auth_manager
        .login(request, &client.context)
        .await
        .inspect_err(|e| note_throttle(e, "login", &client))?;

    Ok(Json(tokens))
}

/// Exchange a refresh token for a new pair; the presented token is spent.
pub async fn refresh_token(
    State(state): State<AppState>,
    client: ClientInfo,
    Json(payload): Json<RefreshPayload>,
) -> Result<Json<TokenPair>, ApiError> {
    let device_fp = fingerprint(payload.device_fingerprint, &client);
    let tokens = state
        .auth_manager
        .refresh(&payload.refresh_token, device_fp.as_deref())
        .await
        .inspect_err(|e| note_throttle(e, "refresh", &client))?;

    Ok(Json(tokens))
}

/// Revoke the session behind the presented access token.
///
/// Answers `204 No Content`, also when the session was already revoked.
pub async fn logout(
    State(state): State<AppState>,
    client: ClientInfo,
) -> Result<StatusCode, ApiError> {
    let token = client.bearer()?.ok_or(AuthError::InvalidToken)?;
    state
        .auth_manager
        .logout(token, client.fingerprint())
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Profile of the authenticated caller
pub async fn me(
    State(state): State<AppState>,
    client: ClientInfo,
) -> Result<Json<PublicProfile>, ApiError> {
    let profile = state
        .auth_manager
        .current_user(client.bearer()?, client.fingerprint())
        .await?;

    Ok(Json(profile))
}

/// Profile of the caller if a token was presented, anonymous otherwise
pub async fn whoami(
    State(state): State<AppState>,
    client: ClientInfo,
) -> Result<Json<WhoAmIResponse>, ApiError> {
    let user = state
        .auth_manager
        .current_user_optional(client.bearer()?, client.fingerprint())
        .await?;

    Ok(Json(WhoAmIResponse {
        authenticated: user.is_some(),
        user,
    }))
}

/// Body field wins over the `X-Device-Fingerprint` header
fn fingerprint(from_body: Option<String>, client: &ClientInfo) -> Option<String> {
    from_body
        .filter(|fp| !fp.trim().is_empty())
        .or_else(|| client.fingerprint.clone())
}

fn note_throttle(err: &AuthError, endpoint: &str, client: &ClientInfo) {
    if let Some(retry_after) = err.retry_after() {
        log_security_event(
            "rate_limited",
            None,
            Some(&client.context.ip),
            &format!("{} throttled for {}s", endpoint, retry_after),
        );
    }
}
