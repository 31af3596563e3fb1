//! Store call timeout and retry helpers
//!
//! Every call into the user, session or counter store is bounded by a timeout
//! so a slow dependency cannot pin request-handling tasks. Session and counter
//! store calls may additionally be retried a bounded number of times.

use std::{future::Future, time::Duration};

use tokio::time::timeout;
use tokio_retry::{
    RetryIf,
    strategy::{ExponentialBackoff, jitter},
};

/// Default timeout for a single store call (5 seconds)
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of retries after the first attempt
pub const DEFAULT_RETRY_ATTEMPTS: usize = 2;

/// Base delay of the exponential backoff
const RETRY_BASE_DELAY_MS: u64 = 10;

/// Upper bound on a single backoff delay
const RETRY_MAX_DELAY: Duration = Duration::from_millis(200);

/// Error type for timeout operations
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    /// Operation timed out
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The operation itself failed
    #[error(transparent)]
    Inner(E),
}

/// Result type for timeout operations
pub type TimeoutResult<T, E> = Result<T, TimeoutError<E>>;

/// Bounded retry settings for idempotent store calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Per-attempt timeout
    pub io_timeout: Duration,
    /// Retries after the first attempt; zero disables retrying
    pub retries: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            io_timeout: DEFAULT_IO_TIMEOUT,
            retries: DEFAULT_RETRY_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn no_retry(io_timeout: Duration) -> Self {
        Self {
            io_timeout,
            retries: 0,
        }
    }
}

/// Execute a store call with a timeout
///
/// # Example
///
/// ```no_run
/// use daira_auth::db::timeouts::{with_timeout, DEFAULT_IO_TIMEOUT};
/// # use sqlx::PgPool;
/// # async fn example(pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
///
/// let result = with_timeout(
///     DEFAULT_IO_TIMEOUT,
///     sqlx::query("SELECT * FROM users WHERE id = $1")
///         .bind(1_i64)
///         .fetch_one(pool)
/// ).await?;
///
/// # Ok(())
/// # }
/// ```
pub async fn with_timeout<F, T, E>(duration: Duration, future: F) -> TimeoutResult<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match timeout(duration, future).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(TimeoutError::Inner(e)),
        Err(_) => Err(TimeoutError::Timeout(duration)),
    }
}

/// Execute an idempotent store call with a per-attempt timeout and bounded
/// exponential-backoff retries.
///
/// Only use this for operations that are safe to repeat.
pub async fn with_retry<A, F, T, E>(policy: RetryPolicy, action: A) -> TimeoutResult<T, E>
where
    A: FnMut() -> F,
    F: Future<Output = Result<T, E>>,
{
    with_retry_if(policy, action, |_: &TimeoutError<E>| true).await
}

/// Like [`with_retry`], but only failures accepted by `should_retry` are
/// retried; anything else is returned immediately.
pub async fn with_retry_if<A, F, T, E, C>(
    policy: RetryPolicy,
    mut action: A,
    should_retry: C,
) -> TimeoutResult<T, E>
where
    A: FnMut() -> F,
    F: Future<Output = Result<T, E>>,
    C: FnMut(&TimeoutError<E>) -> bool,
{
    let strategy = ExponentialBackoff::from_millis(RETRY_BASE_DELAY_MS)
        .max_delay(RETRY_MAX_DELAY)
        .take(policy.retries)
        .map(jitter);

    RetryIf::spawn(
        strategy,
        || with_timeout(policy.io_timeout, action()),
        should_retry,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_timeout_constants() {
        assert_eq!(DEFAULT_IO_TIMEOUT.as_secs(), 5);
        assert_eq!(RetryPolicy::default().retries, 2);
    }

    #[tokio::test]
    async fn test_timeout_error_display() {
        let err: TimeoutError<String> = TimeoutError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("timed out"));
        assert!(err.to_string().contains("5s"));
    }

    #[tokio::test]
    async fn test_slow_future_times_out() {
        let result: TimeoutResult<(), String> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(TimeoutError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let calls = AtomicUsize::new(0);

        let result: TimeoutResult<usize, String> = with_retry(RetryPolicy::default(), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 { Err("flaky".to_string()) } else { Ok(n) }
        })
        .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_is_bounded() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy {
            io_timeout: Duration::from_secs(1),
            retries: 2,
        };

        let result: TimeoutResult<(), String> = with_retry(policy, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("down".to_string())
        })
        .await;

        assert!(matches!(result, Err(TimeoutError::Inner(ref e)) if e == "down"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_makes_one_attempt() {
        let calls = AtomicUsize::new(0);

        let _: TimeoutResult<(), String> =
            with_retry(RetryPolicy::no_retry(Duration::from_secs(1)), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("down".to_string())
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_if_skips_rejected_errors() {
        let calls = AtomicUsize::new(0);

        let result: TimeoutResult<(), String> = with_retry_if(
            RetryPolicy::default(),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("fatal".to_string())
            },
            |err: &TimeoutError<String>| matches!(err, TimeoutError::Inner(e) if e == "transient"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
