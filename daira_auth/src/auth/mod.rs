//! Authentication module providing registration, login, token refresh and
//! session management.
//!
//! This module implements:
//! - Argon2id password hashing with server-side pepper
//! - HS256 access tokens (15-minute expiry)
//! - Rotating refresh tokens (30-day expiry) with reuse detection
//! - Device binding via hashed client fingerprints
//! - Strict and optional (anonymous) request authentication
//!
//! ## Example
//!
//! ```no_run
//! use daira_auth::auth::{AuthConfig, AuthManager, ClientContext, LoginRequest};
//! use daira_auth::clock::SystemClock;
//! use daira_auth::db::{Database, PgSessionRepository, PgUserRepository};
//! use daira_auth::security::InMemoryCounterStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&Default::default()).await?;
//!     let clock = Arc::new(SystemClock);
//!     let auth = AuthManager::new(
//!         AuthConfig::new("jwt-secret-of-at-least-32-characters"),
//!         "secret_pepper_value",
//!         Arc::new(PgUserRepository::new(db.pool().clone())),
//!         Arc::new(PgSessionRepository::new(db.pool().clone())),
//!         Arc::new(InMemoryCounterStore::new(clock.clone())),
//!         clock,
//!     );
//!
//!     let request = LoginRequest {
//!         email: "player@example.com".to_string(),
//!         password: "SecurePass123".to_string(),
//!         device_fingerprint: None,
//!     };
//!
//!     let tokens = auth.login(request, &ClientContext::default()).await?;
//!     let user_id = auth
//!         .authenticator()
//!         .authenticate(Some(&tokens.access_token), None)
//!         .await?;
//!     println!("Logged in as user {}", user_id);
//!     Ok(())
//! }
//! ```

pub mod authenticator;
pub mod config;
pub mod device;
pub mod errors;
pub mod manager;
pub mod models;
pub mod password;
pub mod session;
pub mod tokens;
pub mod validation;

pub use authenticator::{RequestAuthenticator, extract_bearer};
pub use config::AuthConfig;
pub use errors::{AuthError, AuthResult, ErrorCategory};
pub use manager::AuthManager;
pub use models::{
    ClientContext, LoginRequest, NewUser, Principal, PublicProfile, RegisterRequest, Session,
    SessionStatus, TokenPair, User, UserId,
};
pub use password::PasswordHasher;
pub use session::SessionStore;
pub use tokens::{FingerprintPolicy, TokenClaims, TokenCodec, TokenType};
