//! Request middleware.
//!
//! [`auth_middleware`] guards protected routes: it validates the bearer
//! access token and stores the resulting [`Principal`] in request extensions
//! for downstream handlers.
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use daira_auth::Principal;
//!
//! async fn protected_handler(Extension(principal): Extension<Principal>) -> String {
//!     format!("Authenticated as {:?}", principal.user_id())
//! }
//! # let _ = protected_handler;
//! ```

use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use daira_auth::{AuthError, Principal};

use super::{AppState, client::ClientInfo, error::ApiError};
use crate::logging::log_api_request;

/// Require a valid access token.
///
/// Missing, malformed, expired or refresh-typed tokens answer `401` before
/// the handler runs.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let client = ClientInfo::from_parts(&parts, state.trust_forwarded_for);
    request = Request::from_parts(parts, body);

    let token = match client.bearer() {
        Ok(Some(token)) => token,
        Ok(None) => return ApiError(AuthError::InvalidToken).into_response(),
        Err(e) => return ApiError(e).into_response(),
    };

    match state
        .auth_manager
        .authenticator()
        .authenticate(Some(token), client.fingerprint())
        .await
    {
        Ok(user_id) => {
            request.extensions_mut().insert(Principal::User(user_id));
            next.run(request).await
        }
        Err(e) => ApiError(e).into_response(),
    }
}

/// Log method, path, status and latency of every request
pub async fn log_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    log_api_request(
        &method,
        &path,
        response.status().as_u16(),
        started.elapsed().as_millis() as u64,
    );
    response
}
