//! Integration tests for rate limiting.
//!
//! Tests fixed-window limits, fail-open behaviour when the counter store is
//! down or slow, and atomicity under concurrent callers.

use argon2::Params;
use async_trait::async_trait;
use daira_auth::auth::{
    AuthConfig, AuthManager, ClientContext, LoginRequest, PasswordHasher, RegisterRequest,
};
use daira_auth::clock::ManualClock;
use daira_auth::db::timeouts::RetryPolicy;
use daira_auth::db::{InMemorySessionRepository, InMemoryUserRepository};
use daira_auth::security::{
    CounterStore, CounterStoreError, CounterStoreResult, InMemoryCounterStore, RateLimitResult,
    RateLimiter,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinSet;

const T0: i64 = 1_700_000_000;

/// Counter store that is always unreachable
struct DownCounterStore {
    calls: AtomicUsize,
}

#[async_trait]
impl CounterStore for DownCounterStore {
    async fn incr_with_expiry(&self, _key: &str, _window_secs: u64) -> CounterStoreResult<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CounterStoreError::Connection("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> CounterStoreResult<()> {
        Err(CounterStoreError::Connection("connection refused".to_string()))
    }
}

/// Counter store that never answers in time
struct HungCounterStore;

#[async_trait]
impl CounterStore for HungCounterStore {
    async fn incr_with_expiry(&self, _key: &str, _window_secs: u64) -> CounterStoreResult<i64> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(1)
    }

    async fn delete(&self, _key: &str) -> CounterStoreResult<()> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(())
    }
}

/// Counter store whose commands fail after connecting
struct BrokenCommandStore {
    calls: AtomicUsize,
}

#[async_trait]
impl CounterStore for BrokenCommandStore {
    async fn incr_with_expiry(&self, _key: &str, _window_secs: u64) -> CounterStoreResult<i64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CounterStoreError::Command("READONLY".to_string()))
    }

    async fn delete(&self, _key: &str) -> CounterStoreResult<()> {
        Ok(())
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        io_timeout: Duration::from_millis(50),
        retries: 2,
    }
}

#[tokio::test]
async fn test_unreachable_store_fails_open() {
    let store = Arc::new(DownCounterStore {
        calls: AtomicUsize::new(0),
    });
    let limiter = RateLimiter::new(store.clone()).with_retry_policy(fast_policy());

    for _ in 0..6 {
        let result = limiter.check("login:a@x.com", 5, 900, T0).await;
        assert!(result.is_allowed(), "Store outage must not block requests");
        assert_eq!(result.retry_after(), 0);
    }

    // Connection failures are retried within bounds: 1 attempt + 2 retries
    assert_eq!(store.calls.load(Ordering::SeqCst), 6 * 3);

    assert_eq!(limiter.record_failed_attempt("a@x.com").await, 0);
    limiter.clear_failed_attempts("a@x.com").await;
}

#[tokio::test]
async fn test_hung_store_times_out_and_fails_open() {
    let limiter = RateLimiter::new(Arc::new(HungCounterStore)).with_retry_policy(RetryPolicy {
        io_timeout: Duration::from_millis(20),
        retries: 2,
    });

    let started = std::time::Instant::now();
    let result = limiter.check("login:a@x.com", 5, 900, T0).await;

    assert!(result.is_allowed());
    // Timeouts are not retried, so one timeout bounds the call
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_command_failures_are_not_retried() {
    let store = Arc::new(BrokenCommandStore {
        calls: AtomicUsize::new(0),
    });
    let limiter = RateLimiter::new(store.clone()).with_retry_policy(fast_policy());

    assert!(limiter.check("k", 1, 60, T0).await.is_allowed());
    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_login_still_works_when_counter_store_is_down() {
    let clock = Arc::new(ManualClock::new(T0));
    let mut config = AuthConfig::new("security-test-secret-0123456789abcdef");
    config.io_timeout = Duration::from_millis(50);

    let auth = AuthManager::new(
        config,
        "pepper",
        Arc::new(InMemoryUserRepository::new()),
        Arc::new(InMemorySessionRepository::new()),
        Arc::new(DownCounterStore {
            calls: AtomicUsize::new(0),
        }),
        clock,
    )
    .with_password_hasher(PasswordHasher::with_params(
        "pepper",
        Params::new(1024, 1, 1, None).unwrap(),
    ));

    let ctx = ClientContext::default();
    auth.register(
        RegisterRequest {
            username: "alice".to_string(),
            email: "a@x.com".to_string(),
            password: "password123".to_string(),
            display_name: None,
            device_fingerprint: None,
        },
        &ctx,
    )
    .await
    .expect("Registration should fail open past the limiter");

    // Far more than the login limit, none throttled
    for _ in 0..8 {
        let result = auth
            .login(
                LoginRequest {
                    email: "a@x.com".to_string(),
                    password: "password123".to_string(),
                    device_fingerprint: None,
                },
                &ctx,
            )
            .await;
        assert!(result.is_ok());
    }
}

#[tokio::test]
async fn test_concurrent_checks_are_atomic_across_tasks() {
    let clock = Arc::new(ManualClock::new(T0));
    let limiter = Arc::new(RateLimiter::new(Arc::new(InMemoryCounterStore::new(clock))));

    let mut join_set = JoinSet::new();
    for i in 0..50 {
        let limiter = Arc::clone(&limiter);
        // Two identifiers interleaved; each has its own limit of 10
        let key = if i % 2 == 0 { "refresh:1" } else { "refresh:2" };
        join_set.spawn(async move { (key, limiter.check(key, 10, 3600, T0).await) });
    }

    let mut allowed = std::collections::HashMap::new();
    while let Some(result) = join_set.join_next().await {
        let (key, result) = result.unwrap();
        if result.is_allowed() {
            *allowed.entry(key).or_insert(0) += 1;
        }
    }

    assert_eq!(allowed.get("refresh:1"), Some(&10));
    assert_eq!(allowed.get("refresh:2"), Some(&10));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_exactly_n_allowed_then_bounded_retry_after(
        max in 1u32..20,
        window in 1u64..7200,
        offset in 0i64..1_000_000,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let now = T0 + offset;
            let clock = Arc::new(ManualClock::new(now));
            let limiter = RateLimiter::new(Arc::new(InMemoryCounterStore::new(clock)));

            for _ in 0..max {
                prop_assert!(limiter.check("p", max, window, now).await.is_allowed());
            }

            match limiter.check("p", max, window, now).await {
                RateLimitResult::Locked { retry_after } => {
                    prop_assert!(retry_after > 0);
                    prop_assert!(retry_after <= window);
                }
                RateLimitResult::Allowed { .. } => prop_assert!(false, "N+1th call must be denied"),
            }
            Ok(())
        })?;
    }
}
