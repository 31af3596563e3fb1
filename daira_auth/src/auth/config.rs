//! Authentication configuration.

use std::{fmt, time::Duration};

use super::tokens::FingerprintPolicy;
use crate::{
    db::timeouts::{DEFAULT_IO_TIMEOUT, DEFAULT_RETRY_ATTEMPTS, RetryPolicy},
    security::RateLimitConfig,
};

/// Access token lifetime (15 minutes)
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

/// Refresh token and session lifetime (30 days)
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 30 * 24 * 3600;

/// Settings for [`super::AuthManager`]
#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 signing secret
    pub jwt_secret: String,

    pub access_ttl_secs: i64,

    /// Lifetime of refresh tokens and of the sessions they belong to
    pub refresh_ttl_secs: i64,

    pub fingerprint_policy: FingerprintPolicy,

    /// Timeout for a single user, session or counter store call
    pub io_timeout: Duration,

    /// Retries for session and counter store calls
    pub store_retries: usize,

    pub login_limit: RateLimitConfig,
    pub refresh_limit: RateLimitConfig,
    pub register_limit: RateLimitConfig,
}

impl AuthConfig {
    /// Defaults around `jwt_secret`; env overrides are applied by the caller
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
            fingerprint_policy: FingerprintPolicy::Advisory,
            io_timeout: DEFAULT_IO_TIMEOUT,
            store_retries: DEFAULT_RETRY_ATTEMPTS,
            login_limit: RateLimitConfig::login(),
            refresh_limit: RateLimitConfig::refresh(),
            register_limit: RateLimitConfig::register(),
        }
    }

    pub fn with_fingerprint_policy(mut self, policy: FingerprintPolicy) -> Self {
        self.fingerprint_policy = policy;
        self
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    /// Retry policy for session and counter store calls
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            io_timeout: self.io_timeout,
            retries: self.store_retries,
        }
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .field("fingerprint_policy", &self.fingerprint_policy)
            .field("io_timeout", &self.io_timeout)
            .field("store_retries", &self.store_retries)
            .field("login_limit", &self.login_limit)
            .field("refresh_limit", &self.refresh_limit)
            .field("register_limit", &self.register_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AuthConfig::new("secret");
        assert_eq!(config.access_ttl_secs, 900);
        assert_eq!(config.refresh_ttl_secs, 2_592_000);
        assert_eq!(config.fingerprint_policy, FingerprintPolicy::Advisory);
        assert_eq!(config.retry_policy().retries, 2);
        assert_eq!(config.retry_policy().io_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", AuthConfig::new("super-secret-value"));
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("<redacted>"));
    }
}
