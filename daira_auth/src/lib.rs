//! # Daira Auth
//!
//! Authentication and session core for the Daira API.
//!
//! This library issues, validates and rotates short-lived access tokens and
//! longer-lived refresh tokens bound to a device, backed by a persisted session
//! record and protected by fixed-window rate limiting.
//!
//! ## Architecture
//!
//! Components, leaves first:
//!
//! - **PasswordHasher**: salted Argon2id hashing with a server-side pepper
//! - **RateLimiter**: fixed-window counters over a shared [`security::CounterStore`]
//! - **TokenCodec**: signed, time-bounded claim sets (access/refresh)
//! - **SessionStore**: persisted session records over a [`db::SessionRepository`]
//! - **AuthManager**: register, login, refresh, logout and current-user flows
//! - **RequestAuthenticator**: per-request bearer token to principal id
//!
//! Every component takes its dependencies (stores, secret, [`clock::Clock`])
//! at construction; there is no global state.
//!
//! ## Example
//!
//! ```no_run
//! use daira_auth::auth::{AuthConfig, AuthManager, ClientContext, RegisterRequest};
//! use daira_auth::clock::SystemClock;
//! use daira_auth::db::{InMemorySessionRepository, InMemoryUserRepository};
//! use daira_auth::security::InMemoryCounterStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), daira_auth::auth::AuthError> {
//! let clock = Arc::new(SystemClock);
//! let auth = AuthManager::new(
//!     AuthConfig::new("a-secret-of-at-least-thirty-two-chars!!"),
//!     "pepper-value-123",
//!     Arc::new(InMemoryUserRepository::new()),
//!     Arc::new(InMemorySessionRepository::new()),
//!     Arc::new(InMemoryCounterStore::new(clock.clone())),
//!     clock,
//! );
//!
//! let tokens = auth
//!     .register(
//!         RegisterRequest {
//!             username: "alice".to_string(),
//!             email: "a@x.com".to_string(),
//!             password: "password123".to_string(),
//!             display_name: None,
//!             device_fingerprint: None,
//!         },
//!         &ClientContext::default(),
//!     )
//!     .await?;
//! println!("access token expires in {}s", tokens.expires_in);
//! # Ok(())
//! # }
//! ```

/// Injectable time source.
pub mod clock;

/// Tokens, sessions, credentials and the orchestrating auth flows.
pub mod auth;

/// Shared counter store and fixed-window rate limiting.
pub mod security;

/// Persistence: connection pool, repositories, timeouts and RLS context.
pub mod db;

pub use auth::{AuthError, AuthManager, AuthResult, Principal, RequestAuthenticator, TokenPair};
