//! Fixed-window rate limiting over a shared counter store.
//!
//! Requests are counted in buckets keyed by `key:floor(now / window)`. The
//! increment is a single atomic store operation, so concurrent callers on any
//! service instance never undercount.
//!
//! If the counter store is unreachable, errors, or times out, the limiter
//! fails open: the request is allowed and a warning is logged. Availability
//! of login and refresh takes priority over strict throttling while the store
//! is down.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{
    counter_store::CounterStore,
    errors::{CounterStoreError, InvalidRateLimit},
};
use crate::db::timeouts::{RetryPolicy, TimeoutError, with_retry, with_retry_if};

/// Window of the failed-login counter (1 hour)
pub const FAILED_ATTEMPT_WINDOW_SECS: u64 = 3600;

/// Rate limit policy for one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Key namespace, e.g. "login"
    pub namespace: String,

    /// Maximum requests allowed per window
    pub max_requests: u32,

    /// Window length in seconds
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn new(namespace: impl Into<String>, max_requests: u32, window_secs: u64) -> Self {
        Self {
            namespace: namespace.into(),
            max_requests,
            window_secs,
        }
    }

    /// Login: 5 per 15 minutes, keyed by email
    pub fn login() -> Self {
        Self::new("login", 5, 900)
    }

    /// Refresh: 10 per hour, keyed by user id
    pub fn refresh() -> Self {
        Self::new("refresh", 10, 3600)
    }

    /// Registration: 3 per hour, keyed by client IP
    pub fn register() -> Self {
        Self::new("register", 3, 3600)
    }

    /// Apply `RATE_LIMIT_{NAMESPACE}_ATTEMPTS` and `RATE_LIMIT_{NAMESPACE}_WINDOW_SECS`
    pub fn with_env_overrides(self) -> Result<Self, InvalidRateLimit> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from `lookup`. Unset keeps the current value; a value
    /// that is not a positive integer is rejected.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, InvalidRateLimit> {
        let prefix = format!("RATE_LIMIT_{}", self.namespace.to_uppercase());

        if let Some(max_requests) = positive(&lookup, &format!("{}_ATTEMPTS", prefix))? {
            self.max_requests = max_requests;
        }
        if let Some(window_secs) = positive(&lookup, &format!("{}_WINDOW_SECS", prefix))? {
            self.window_secs = window_secs;
        }

        Ok(self)
    }
}

fn positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &str,
) -> Result<Option<T>, InvalidRateLimit>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };

    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(Some(value)),
        _ => Err(InvalidRateLimit {
            var: var.to_string(),
            value: raw,
        }),
    }
}

/// Rate limit check result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request allowed
    Allowed { remaining: u32 },

    /// Window exhausted
    Locked { retry_after: u64 },
}

impl RateLimitResult {
    /// Check if request is allowed
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }

    /// Get remaining attempts (if allowed)
    pub fn remaining(&self) -> Option<u32> {
        match self {
            RateLimitResult::Allowed { remaining } => Some(*remaining),
            RateLimitResult::Locked { .. } => None,
        }
    }

    /// Seconds until the window resets; zero when allowed
    pub fn retry_after(&self) -> u64 {
        match self {
            RateLimitResult::Allowed { .. } => 0,
            RateLimitResult::Locked { retry_after } => *retry_after,
        }
    }
}

/// Counter-store backed fixed-window rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    retry: RetryPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Count one request against `key` and decide whether it may proceed.
    ///
    /// Exactly `max_requests` calls per window are allowed; later calls get
    /// `Locked` with the seconds left in the current window.
    pub async fn check(
        &self,
        key: &str,
        max_requests: u32,
        window_secs: u64,
        now: i64,
    ) -> RateLimitResult {
        let window = window_secs.max(1) as i64;
        let bucket = now.div_euclid(window);
        let bucket_key = format!("ratelimit:{}:{}", key, bucket);

        let count = match self.incr(&bucket_key, window as u64).await {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    event_type = "rate_limit_fail_open",
                    key = %key,
                    error = %e,
                    "Counter store unavailable, allowing request"
                );
                return RateLimitResult::Allowed {
                    remaining: max_requests,
                };
            }
        };

        if count <= i64::from(max_requests) {
            RateLimitResult::Allowed {
                remaining: (i64::from(max_requests) - count) as u32,
            }
        } else {
            let retry_after = (window - now.rem_euclid(window)) as u64;
            debug!(key = %key, count, retry_after, "Rate limit exceeded");
            RateLimitResult::Locked { retry_after }
        }
    }

    /// Check `identifier` against a named policy
    pub async fn check_policy(
        &self,
        config: &RateLimitConfig,
        identifier: &str,
        now: i64,
    ) -> RateLimitResult {
        let key = format!("{}:{}", config.namespace, identifier);
        self.check(&key, config.max_requests, config.window_secs, now)
            .await
    }

    /// Count a failed login for `identifier` in an independent one-hour window.
    ///
    /// Returns the failures recorded so far; zero when the store is down. The
    /// count is informational and never blocks a login by itself.
    pub async fn record_failed_attempt(&self, identifier: &str) -> u64 {
        let key = failed_attempt_key(identifier);

        match self.incr(&key, FAILED_ATTEMPT_WINDOW_SECS).await {
            Ok(count) => count.max(0) as u64,
            Err(e) => {
                warn!(
                    event_type = "failed_attempt_not_recorded",
                    error = %e,
                    "Counter store unavailable, failed attempt not recorded"
                );
                0
            }
        }
    }

    /// Forget failed logins for `identifier`
    pub async fn clear_failed_attempts(&self, identifier: &str) {
        let key = failed_attempt_key(identifier);
        let store = &self.store;

        let result = with_retry(self.retry, || store.delete(&key)).await;
        if let Err(e) = result {
            warn!(
                event_type = "failed_attempt_not_cleared",
                error = %CounterStoreError::from(e),
                "Counter store unavailable, failed attempts not cleared"
            );
        }
    }

    /// Increment with timeout. Only connection failures are retried: a command
    /// that timed out or failed mid-flight may already have been counted.
    async fn incr(&self, key: &str, window_secs: u64) -> Result<i64, CounterStoreError> {
        let store = &self.store;

        with_retry_if(
            self.retry,
            || store.incr_with_expiry(key, window_secs),
            |err: &TimeoutError<CounterStoreError>| {
                matches!(err, TimeoutError::Inner(CounterStoreError::Connection(_)))
            },
        )
        .await
        .map_err(CounterStoreError::from)
    }
}

fn failed_attempt_key(identifier: &str) -> String {
    format!("failed_login:{}", identifier)
}
