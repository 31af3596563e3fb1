//! Per-request caller facts: address, user agent, device fingerprint and
//! bearer credentials.
//!
//! The caller address is the socket peer. `X-Forwarded-For` is only honoured
//! when the service is configured to sit behind a trusted proxy.

use std::{convert::Infallible, net::SocketAddr};

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{
        HeaderMap,
        header::{AUTHORIZATION, USER_AGENT},
        request::Parts,
    },
};
use daira_auth::auth::{AuthError, ClientContext, extract_bearer};

use super::AppState;

pub const FINGERPRINT_HEADER: &str = "x-device-fingerprint";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Everything the auth core needs to know about the caller
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub context: ClientContext,
    pub fingerprint: Option<String>,
    authorization: Option<String>,
}

impl ClientInfo {
    pub fn from_parts(parts: &Parts, trust_forwarded_for: bool) -> Self {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Self::from_headers(&parts.headers, peer, trust_forwarded_for)
    }

    pub fn from_headers(
        headers: &HeaderMap,
        peer: Option<String>,
        trust_forwarded_for: bool,
    ) -> Self {
        let forwarded = if trust_forwarded_for {
            header_str(headers, FORWARDED_FOR_HEADER)
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(str::to_string)
        } else {
            None
        };
        let ip = forwarded.or(peer).unwrap_or_else(|| "unknown".to_string());

        Self {
            context: ClientContext {
                ip,
                user_agent: header_str(headers, USER_AGENT.as_str()).map(str::to_string),
            },
            fingerprint: header_str(headers, FINGERPRINT_HEADER)
                .map(str::trim)
                .filter(|fp| !fp.is_empty())
                .map(str::to_string),
            authorization: header_str(headers, AUTHORIZATION.as_str()).map(str::to_string),
        }
    }

    /// Bearer token from the `Authorization` header.
    ///
    /// A missing header is `Ok(None)`; a header with another scheme is an
    /// invalid token rather than an anonymous caller.
    pub fn bearer(&self) -> Result<Option<&str>, AuthError> {
        match &self.authorization {
            None => Ok(None),
            Some(header) => extract_bearer(header)
                .map(Some)
                .ok_or(AuthError::InvalidToken),
        }
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }
}

impl FromRequestParts<AppState> for ClientInfo {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts, state.trust_forwarded_for))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
