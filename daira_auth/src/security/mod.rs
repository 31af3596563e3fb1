//! Abuse protection for the authentication endpoints.
//!
//! Fixed-window rate limiting over a shared counter store:
//! - **Login**: 5 attempts per 15 minutes, keyed by email
//! - **Refresh**: 10 per hour, keyed by user id
//! - **Registration**: 3 per hour, keyed by client IP
//!
//! Failed logins are additionally counted in a one-hour window for later
//! escalation. The limiter fails open when the counter store is unavailable.
//!
//! ## Example
//!
//! ```no_run
//! use daira_auth::clock::{Clock, SystemClock};
//! use daira_auth::security::{InMemoryCounterStore, RateLimitConfig, RateLimiter};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let clock = Arc::new(SystemClock);
//! let limiter = RateLimiter::new(Arc::new(InMemoryCounterStore::new(clock.clone())));
//!
//! let result = limiter
//!     .check_policy(&RateLimitConfig::login(), "alice@example.com", clock.now())
//!     .await;
//!
//! if !result.is_allowed() {
//!     println!("Rate limited, retry after {} seconds", result.retry_after());
//! }
//! # }
//! ```

pub mod counter_store;
pub mod errors;
pub mod rate_limiter;

pub use counter_store::{CounterStore, InMemoryCounterStore, RedisCounterStore};
pub use errors::{CounterStoreError, CounterStoreResult, InvalidRateLimit};
pub use rate_limiter::{RateLimitConfig, RateLimitResult, RateLimiter};
