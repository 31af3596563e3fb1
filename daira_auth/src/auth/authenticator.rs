//! Per-request authentication.
//!
//! Turns a bearer token (and an optional device fingerprint) into the
//! principal that downstream authorization and row-level security act on.
//! Only the token itself is consulted; session state is checked by the flows
//! that need it.

use std::sync::Arc;

use tracing::warn;

use super::{
    errors::{AuthError, AuthResult},
    models::{Principal, UserId},
    tokens::{TokenClaims, TokenCodec, TokenType},
};
use crate::clock::Clock;

/// Strip the `Bearer` scheme from an `Authorization` header value.
///
/// The scheme is matched case-insensitively. Returns `None` for other schemes
/// and for an empty token.
pub fn extract_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Bearer token authenticator
#[derive(Clone)]
pub struct RequestAuthenticator {
    codec: Arc<TokenCodec>,
    clock: Arc<dyn Clock>,
}

impl RequestAuthenticator {
    pub fn new(codec: Arc<TokenCodec>, clock: Arc<dyn Clock>) -> Self {
        Self { codec, clock }
    }

    /// Strict path: a valid access token is required.
    ///
    /// Fails with `InvalidToken` when no token is given.
    pub async fn authenticate(
        &self,
        token: Option<&str>,
        fingerprint: Option<&str>,
    ) -> AuthResult<UserId> {
        let claims = self.access_claims(token, fingerprint)?;
        Ok(claims.sub)
    }

    /// Optional path: no token yields [`Principal::Anonymous`].
    ///
    /// A token that is present but invalid still fails.
    pub async fn authenticate_optional(
        &self,
        token: Option<&str>,
        fingerprint: Option<&str>,
    ) -> AuthResult<Principal> {
        match token {
            None => Ok(Principal::Anonymous),
            Some(_) => Ok(Principal::User(
                self.authenticate(token, fingerprint).await?,
            )),
        }
    }

    /// Decode an access token and check its type and fingerprint
    pub fn access_claims(
        &self,
        token: Option<&str>,
        fingerprint: Option<&str>,
    ) -> AuthResult<TokenClaims> {
        let token = token.ok_or(AuthError::InvalidToken)?;
        let claims = self.codec.decode(token, self.clock.now())?;

        match claims.token_type {
            TokenType::Access => {}
            TokenType::Refresh => return Err(AuthError::WrongTokenType),
        }

        if !self.codec.verify_fingerprint(&claims.device_id, fingerprint) {
            warn!(
                event_type = "fingerprint_mismatch",
                user_id = claims.sub,
                "Access token presented from a different device"
            );
            return Err(AuthError::FingerprintMismatch);
        }

        Ok(claims)
    }
}
