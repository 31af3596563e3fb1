//! Authentication manager implementation.

use std::sync::{Arc, OnceLock};

use tracing::{error, info, warn};

use super::{
    authenticator::RequestAuthenticator,
    config::AuthConfig,
    device::derive_device_id,
    errors::{AuthError, AuthResult},
    models::{
        ClientContext, LoginRequest, NewUser, PublicProfile, RegisterRequest, TokenPair, User,
        UserId,
    },
    password::PasswordHasher,
    session::SessionStore,
    tokens::{TokenClaims, TokenCodec, TokenType},
    validation,
};
use crate::{
    clock::Clock,
    db::{SessionRepository, UserRepository, timeouts::with_timeout},
    security::{CounterStore, RateLimitConfig, RateLimitResult, RateLimiter},
};

/// Plaintext hashed once to give unknown-email logins a real hash to verify
/// against, so they cost the same as a wrong password
const TIMING_DUMMY_PASSWORD: &str = "timing-equalization-dummy";

/// Authentication manager
///
/// Orchestrates registration, login, refresh and logout over the user store,
/// session store and rate limiter. Each flow checks rate limits before it
/// touches credentials or sessions, and only issues tokens as its last step.
#[derive(Clone)]
pub struct AuthManager {
    config: AuthConfig,
    hasher: PasswordHasher,
    codec: Arc<TokenCodec>,
    users: Arc<dyn UserRepository>,
    sessions: SessionStore,
    limiter: RateLimiter,
    authenticator: RequestAuthenticator,
    clock: Arc<dyn Clock>,
    dummy_hash: Arc<OnceLock<String>>,
}

impl AuthManager {
    /// Create a new authentication manager
    ///
    /// # Arguments
    ///
    /// * `config` - Token lifetimes, signing secret, limits and I/O bounds
    /// * `pepper` - Server-side pepper for password hashing
    /// * `users` - User record store
    /// * `sessions` - Session record store
    /// * `counters` - Shared counter store for rate limiting
    /// * `clock` - Time source for every expiry decision
    pub fn new(
        config: AuthConfig,
        pepper: impl Into<String>,
        users: Arc<dyn UserRepository>,
        sessions: Arc<dyn SessionRepository>,
        counters: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let codec = Arc::new(
            TokenCodec::new(
                &config.jwt_secret,
                config.access_ttl_secs,
                config.refresh_ttl_secs,
            )
            .with_fingerprint_policy(config.fingerprint_policy),
        );
        let retry = config.retry_policy();

        Self {
            hasher: PasswordHasher::new(pepper),
            authenticator: RequestAuthenticator::new(codec.clone(), clock.clone()),
            sessions: SessionStore::new(sessions, config.refresh_ttl_secs, retry),
            limiter: RateLimiter::new(counters).with_retry_policy(retry),
            codec,
            users,
            clock,
            config,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    /// Replace the password hasher, e.g. to tune the work factor
    pub fn with_password_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self.dummy_hash = Arc::new(OnceLock::new());
        self
    }

    /// Per-request authenticator sharing this manager's codec and clock
    pub fn authenticator(&self) -> &RequestAuthenticator {
        &self.authenticator
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Register a new user and start their first session
    ///
    /// # Errors
    ///
    /// * `AuthError::Validation` - Malformed username, email, password or display name
    /// * `AuthError::TooManyRequests` - Registration limit for the client IP reached
    /// * `AuthError::EmailTaken` - Email already exists
    /// * `AuthError::HandleTaken` - Username already exists
    /// * `AuthError::Unavailable` - A store failed; the user row may already exist
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: &ClientContext,
    ) -> AuthResult<TokenPair> {
        validation::validate_username(&request.username)?;
        let email = validation::normalize_email(&request.email);
        validation::validate_email(&email)?;
        validation::validate_password(&request.password)?;
        let display_name =
            validation::resolve_display_name(request.display_name.as_deref(), &request.username)?;

        self.enforce(&self.config.register_limit, &client.ip).await?;

        if self
            .with_user_store(self.users.find_by_email(&email))
            .await?
            .is_some()
        {
            return Err(AuthError::EmailTaken);
        }

        if self
            .with_user_store(self.users.find_by_username(&request.username))
            .await?
            .is_some()
        {
            return Err(AuthError::HandleTaken);
        }

        let password_hash = self.hasher.hash(&request.password)?;

        // Single attempt: a retried insert could double-register
        let user = self
            .with_user_store(self.users.insert(&NewUser {
                username: request.username,
                email,
                password_hash,
                display_name,
            }))
            .await?;

        info!(user_id = user.id, "User registered");

        self.start_session(user.id, request.device_fingerprint.as_deref(), client)
            .await
            .inspect_err(|e| {
                error!(
                    user_id = user.id,
                    error = %e,
                    "User created but session could not be started"
                );
            })
    }

    /// Log in with email and password
    ///
    /// Unknown email and wrong password both fail with
    /// `AuthError::InvalidCredentials` and cost one password verification.
    pub async fn login(
        &self,
        request: LoginRequest,
        client: &ClientContext,
    ) -> AuthResult<TokenPair> {
        let email = validation::normalize_email(&request.email);

        self.enforce(&self.config.login_limit, &email).await?;

        let user = self
            .with_user_store(self.users.find_by_email(&email))
            .await?
            .filter(|user| !user.is_deleted());

        let Some(user) = user else {
            let _ = self
                .hasher
                .verify(&request.password, self.dummy_hash());
            return Err(self.reject_login(&email, client).await);
        };

        if !self.hasher.verify(&request.password, &user.password_hash) {
            return Err(self.reject_login(&email, client).await);
        }

        self.limiter.clear_failed_attempts(&email).await;

        let tokens = self
            .start_session(user.id, request.device_fingerprint.as_deref(), client)
            .await?;

        info!(user_id = user.id, "User logged in");
        Ok(tokens)
    }

    /// Exchange a refresh token for a new token pair on the same session.
    ///
    /// The presented token is superseded: presenting it again revokes the
    /// whole session.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        fingerprint: Option<&str>,
    ) -> AuthResult<TokenPair> {
        let now = self.clock.now();
        let claims = self.codec.decode(refresh_token, now)?;

        match claims.token_type {
            TokenType::Refresh => {}
            TokenType::Access => return Err(AuthError::WrongTokenType),
        }

        self.enforce(&self.config.refresh_limit, &claims.sub.to_string())
            .await?;

        let session = self
            .sessions
            .load(&claims.session_id, claims.sub)
            .await?
            .filter(|session| session.status_at(now).is_valid())
            .ok_or(AuthError::SessionInvalid)?;

        if session.refresh_jti.as_deref() != Some(claims.jti.as_str()) {
            warn!(
                event_type = "refresh_token_reuse",
                user_id = claims.sub,
                "Superseded refresh token presented, revoking session"
            );
            self.sessions.revoke(&session.id, now).await?;
            return Err(AuthError::SessionInvalid);
        }

        if !self.codec.verify_fingerprint(&claims.device_id, fingerprint) {
            warn!(
                event_type = "fingerprint_mismatch",
                user_id = claims.sub,
                "Refresh token presented from a different device"
            );
            return Err(AuthError::FingerprintMismatch);
        }

        let access_token =
            self.codec
                .issue_access(claims.sub, &session.id, &session.device_id, now)?;
        let (refresh_token, jti) =
            self.codec
                .issue_refresh(claims.sub, &session.id, &session.device_id, now)?;

        if !self
            .sessions
            .rotate_refresh(&session.id, Some(&claims.jti), &jti)
            .await?
        {
            // A concurrent refresh with the same token won, or the session
            // was revoked in between
            return Err(AuthError::SessionInvalid);
        }

        Ok(TokenPair::bearer(
            access_token,
            refresh_token,
            self.codec.access_ttl_secs(),
        ))
    }

    /// Revoke the session behind `access_token`. Idempotent.
    pub async fn logout(&self, access_token: &str, fingerprint: Option<&str>) -> AuthResult<()> {
        let claims = self
            .authenticator
            .access_claims(Some(access_token), fingerprint)?;

        self.sessions
            .revoke(&claims.session_id, self.clock.now())
            .await?;

        info!(user_id = claims.sub, "User logged out");
        Ok(())
    }

    /// Profile of the caller; requires a valid access token on a live session
    pub async fn current_user(
        &self,
        access_token: Option<&str>,
        fingerprint: Option<&str>,
    ) -> AuthResult<PublicProfile> {
        let user = self.session_user(access_token, fingerprint).await?;
        Ok(PublicProfile::from(&user))
    }

    /// Like [`Self::current_user`], but no token yields `None` (anonymous)
    pub async fn current_user_optional(
        &self,
        access_token: Option<&str>,
        fingerprint: Option<&str>,
    ) -> AuthResult<Option<PublicProfile>> {
        match access_token {
            None => Ok(None),
            Some(_) => self
                .current_user(access_token, fingerprint)
                .await
                .map(Some),
        }
    }

    /// Principal id of the caller if they are an admin
    ///
    /// # Errors
    ///
    /// * `AuthError::Forbidden` - Authenticated, but not an admin
    pub async fn require_admin(
        &self,
        access_token: Option<&str>,
        fingerprint: Option<&str>,
    ) -> AuthResult<UserId> {
        let user = self.session_user(access_token, fingerprint).await?;

        if !user.is_admin {
            warn!(
                event_type = "admin_access_denied",
                user_id = user.id,
                "Non-admin attempted an admin operation"
            );
            return Err(AuthError::Forbidden);
        }

        Ok(user.id)
    }

    /// Delete sessions that are already past their expiry
    pub async fn purge_expired_sessions(&self) -> AuthResult<u64> {
        self.sessions.purge_expired(self.clock.now()).await
    }

    /// Create a session bound to the caller's device and issue its tokens
    async fn start_session(
        &self,
        user_id: UserId,
        fingerprint: Option<&str>,
        client: &ClientContext,
    ) -> AuthResult<TokenPair> {
        let now = self.clock.now();
        let device_id = derive_device_id(fingerprint, client.user_agent.as_deref());

        let session_id = self
            .sessions
            .create(
                user_id,
                &device_id,
                &client.ip,
                client.user_agent.as_deref(),
                now,
            )
            .await?;

        let access_token = self
            .codec
            .issue_access(user_id, &session_id, &device_id, now)?;
        let (refresh_token, jti) = self
            .codec
            .issue_refresh(user_id, &session_id, &device_id, now)?;

        if !self
            .sessions
            .rotate_refresh(&session_id, None, &jti)
            .await?
        {
            return Err(AuthError::Unavailable(
                "new session could not be bound to its refresh token".to_string(),
            ));
        }

        Ok(TokenPair::bearer(
            access_token,
            refresh_token,
            self.codec.access_ttl_secs(),
        ))
    }

    /// Authenticate the access token, check its session is still live and
    /// load the (non-deleted) user
    async fn session_user(
        &self,
        access_token: Option<&str>,
        fingerprint: Option<&str>,
    ) -> AuthResult<User> {
        let claims: TokenClaims = self.authenticator.access_claims(access_token, fingerprint)?;

        let status = self
            .sessions
            .validate(&claims.session_id, claims.sub, self.clock.now())
            .await?;
        if !status.is_valid() {
            return Err(AuthError::SessionInvalid);
        }

        self.with_user_store(self.users.find_by_id(claims.sub))
            .await?
            .filter(|user| !user.is_deleted())
            .ok_or(AuthError::NotFound)
    }

    /// Fail with `TooManyRequests` when `identifier` is over `policy`
    async fn enforce(&self, policy: &RateLimitConfig, identifier: &str) -> AuthResult<()> {
        match self
            .limiter
            .check_policy(policy, identifier, self.clock.now())
            .await
        {
            RateLimitResult::Allowed { .. } => Ok(()),
            RateLimitResult::Locked { retry_after } => {
                warn!(
                    event_type = "rate_limited",
                    policy = %policy.namespace,
                    retry_after,
                    "Rate limit exceeded"
                );
                Err(AuthError::TooManyRequests { retry_after })
            }
        }
    }

    async fn reject_login(&self, email: &str, client: &ClientContext) -> AuthError {
        let failures = self.limiter.record_failed_attempt(email).await;
        warn!(
            event_type = "login_failed",
            ip = %client.ip,
            failures,
            "Invalid login attempt"
        );
        AuthError::InvalidCredentials
    }

    fn dummy_hash(&self) -> &str {
        self.dummy_hash.get_or_init(|| {
            self.hasher
                .hash(TIMING_DUMMY_PASSWORD)
                .unwrap_or_default()
        })
    }

    /// Bound a user store call by the I/O timeout; never retried
    async fn with_user_store<T>(
        &self,
        future: impl Future<Output = AuthResult<T>>,
    ) -> AuthResult<T> {
        Ok(with_timeout(self.config.io_timeout, future).await?)
    }
}
