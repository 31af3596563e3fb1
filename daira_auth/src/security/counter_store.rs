//! Shared counter store backing the rate limiter.
//!
//! The store only needs two primitives: an atomic increment that arms an
//! expiry when it creates the key, and a delete. Redis provides both natively;
//! the in-memory store gives single-process deployments and tests the same
//! semantics.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use deadpool_redis::{Pool as RedisPool, redis::AsyncCommands};
use tokio::sync::Mutex;

use super::errors::{CounterStoreError, CounterStoreResult};
use crate::clock::Clock;

/// Atomic counters with expiry, shared by every service instance
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` by one and return the new value.
    ///
    /// When the increment creates the key (new value 1) the key is set to
    /// expire `window_secs` later.
    async fn incr_with_expiry(&self, key: &str, window_secs: u64) -> CounterStoreResult<i64>;

    /// Remove `key`; removing an absent key is not an error
    async fn delete(&self, key: &str) -> CounterStoreResult<()>;
}

/// Redis-backed counter store
#[derive(Clone)]
pub struct RedisCounterStore {
    pool: RedisPool,
}

impl RedisCounterStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr_with_expiry(&self, key: &str, window_secs: u64) -> CounterStoreResult<i64> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CounterStoreError::Connection(e.to_string()))?;

        let count: i64 = conn
            .incr(key, 1)
            .await
            .map_err(|e| CounterStoreError::Command(e.to_string()))?;

        if count == 1 {
            let _: () = conn
                .expire(key, window_secs as i64)
                .await
                .map_err(|e| CounterStoreError::Command(e.to_string()))?;
        }

        Ok(count)
    }

    async fn delete(&self, key: &str) -> CounterStoreResult<()> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| CounterStoreError::Connection(e.to_string()))?;

        let _: () = conn
            .del(key)
            .await
            .map_err(|e| CounterStoreError::Command(e.to_string()))?;

        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: i64,
    expires_at: i64,
}

#[derive(Debug, Default)]
struct Counters {
    entries: HashMap<String, CounterEntry>,
    last_sweep: i64,
}

impl Counters {
    fn sweep(&mut self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        self.last_sweep = now;
        before - self.entries.len()
    }
}

/// Process-local counter store driven by an injected clock.
///
/// Expired entries are swept on increment, at most once per clock second, so
/// the map only holds live windows plus those that lapsed within the last
/// second.
pub struct InMemoryCounterStore {
    clock: Arc<dyn Clock>,
    counters: Mutex<Counters>,
}

impl InMemoryCounterStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let last_sweep = clock.now();
        Self {
            clock,
            counters: Mutex::new(Counters {
                entries: HashMap::new(),
                last_sweep,
            }),
        }
    }

    /// Current value of `key`, if live
    pub async fn get(&self, key: &str) -> Option<i64> {
        let now = self.clock.now();
        self.counters
            .lock()
            .await
            .entries
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.count)
    }

    /// Number of entries held, live or not yet swept
    pub async fn len(&self) -> usize {
        self.counters.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop expired entries; returns how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        self.counters.lock().await.sweep(now)
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn incr_with_expiry(&self, key: &str, window_secs: u64) -> CounterStoreResult<i64> {
        let now = self.clock.now();
        let mut counters = self.counters.lock().await;

        if now > counters.last_sweep {
            counters.sweep(now);
        }

        let entry = counters.entries.entry(key.to_string()).or_insert(CounterEntry {
            count: 0,
            expires_at: now,
        });

        if entry.expires_at <= now {
            entry.count = 0;
        }

        entry.count += 1;
        if entry.count == 1 {
            entry.expires_at = now + window_secs as i64;
        }

        Ok(entry.count)
    }

    async fn delete(&self, key: &str) -> CounterStoreResult<()> {
        self.counters.lock().await.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test]
    async fn test_incr_arms_expiry_on_first_increment() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = InMemoryCounterStore::new(clock.clone());

        assert_eq!(store.incr_with_expiry("k", 60).await.unwrap(), 1);
        clock.advance(30);
        assert_eq!(store.incr_with_expiry("k", 60).await.unwrap(), 2);

        // The second increment must not push the expiry out
        clock.advance(30);
        assert_eq!(store.get("k").await, None);
        assert_eq!(store.incr_with_expiry("k", 60).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryCounterStore::new(Arc::new(ManualClock::new(0)));

        store.incr_with_expiry("k", 60).await.unwrap();
        store.delete("k").await.unwrap();
        store.delete("k").await.unwrap();

        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let clock = Arc::new(ManualClock::new(0));
        let store = InMemoryCounterStore::new(clock.clone());

        store.incr_with_expiry("short", 10).await.unwrap();
        store.incr_with_expiry("long", 100).await.unwrap();
        clock.advance(50);

        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.get("long").await, Some(1));
    }

    #[tokio::test]
    async fn test_expired_windows_do_not_accumulate() {
        let clock = Arc::new(ManualClock::new(0));
        let store = InMemoryCounterStore::new(clock.clone());

        for window in 0..1000 {
            let key = format!("ratelimit:login:a@x.com:{}", window);
            store.incr_with_expiry(&key, 60).await.unwrap();
            clock.advance(60);
        }

        assert!(store.len().await <= 1);

        // Keys still inside their window survive the sweep
        store.incr_with_expiry("live", 600).await.unwrap();
        clock.advance(1);
        store.incr_with_expiry("other", 600).await.unwrap();
        assert_eq!(store.get("live").await, Some(1));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    #[ignore = "Requires Redis setup"]
    async fn test_redis_counter_store() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let pool = crate::db::create_redis_pool(&url).expect("Failed to create Redis pool");
        let store = RedisCounterStore::new(pool.clone());
        let key = format!("daira:test:counter:{}", std::process::id());

        store.delete(&key).await.unwrap();
        assert_eq!(store.incr_with_expiry(&key, 60).await.unwrap(), 1);

        let mut conn = pool.get().await.expect("Failed to get Redis connection");
        let first_ttl: i64 = conn.ttl(&key).await.unwrap();
        assert!(first_ttl > 0 && first_ttl <= 60, "ttl was {}", first_ttl);

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        // A later increment must not push the expiry out
        assert_eq!(store.incr_with_expiry(&key, 60).await.unwrap(), 2);
        let second_ttl: i64 = conn.ttl(&key).await.unwrap();
        assert!(second_ttl < first_ttl, "ttl went from {} to {}", first_ttl, second_ttl);

        store.delete(&key).await.unwrap();
        store.delete(&key).await.unwrap();
        let exists: bool = conn.exists(&key).await.unwrap();
        assert!(!exists);
    }
}
