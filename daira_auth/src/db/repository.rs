//! Repository trait definitions for testability and dependency injection.
//!
//! The authentication core only talks to users and sessions through these
//! traits. PostgreSQL implementations back production; the in-memory ones
//! back tests and single-process tools.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row, postgres::PgRow};
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::auth::{AuthError, AuthResult, NewUser, Session, User, UserId};

/// Trait for user record operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find user by email, case-insensitively. Soft-deleted users are returned.
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Find user by username, case-insensitively
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>>;

    /// Find user by ID
    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>>;

    /// Insert a user. Duplicates fail with `EmailTaken` or `HandleTaken`.
    async fn insert(&self, user: &NewUser) -> AuthResult<User>;
}

/// Trait for session record operations
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session
    async fn insert(&self, session: &Session) -> AuthResult<()>;

    /// Find a session owned by `user_id`
    async fn find(&self, session_id: &str, user_id: UserId) -> AuthResult<Option<Session>>;

    /// Set `revoked_at` if unset. Returns whether this call revoked it.
    async fn revoke(&self, session_id: &str, now: i64) -> AuthResult<bool>;

    /// Replace the accepted refresh `jti` only if it still equals `expected`
    /// and the session is not revoked. Returns whether the swap happened.
    async fn rotate_refresh(
        &self,
        session_id: &str,
        expected: Option<&str>,
        new_jti: &str,
    ) -> AuthResult<bool>;

    /// Delete sessions that expired before `before`; returns rows removed
    async fn purge_expired(&self, before: i64) -> AuthResult<u64>;
}

/// Map a unique-constraint violation on `users` to the matching taken error
fn map_user_insert_error(err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
    {
        let constraint = db_err.constraint().unwrap_or_default();
        if constraint.contains("email") {
            return AuthError::EmailTaken;
        }
        if constraint.contains("username") {
            return AuthError::HandleTaken;
        }
    }
    AuthError::Database(err)
}

fn user_from_row(r: &PgRow) -> User {
    User {
        id: r.get("id"),
        username: r.get("username"),
        email: r.get("email"),
        password_hash: r.get("password_hash"),
        display_name: r.get("display_name"),
        is_verified: r.get("is_verified"),
        is_admin: r.get("is_admin"),
        created_at: r.get("created_at"),
        deleted_at: r.get("deleted_at"),
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, display_name, is_verified, is_admin, created_at, deleted_at";

/// Default PostgreSQL implementation of `UserRepository`
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(username) = LOWER($1)"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn insert(&self, user: &NewUser) -> AuthResult<User> {
        let row = sqlx::query(&format!(
            "INSERT INTO users (username, email, password_hash, display_name)
             VALUES ($1, $2, $3, $4)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(map_user_insert_error)?;

        Ok(user_from_row(&row))
    }
}

fn session_from_row(r: &PgRow) -> Session {
    Session {
        id: r.get("id"),
        user_id: r.get("user_id"),
        device_id: r.get("device_id"),
        ip_address: r.get("ip_address"),
        user_agent: r.get("user_agent"),
        refresh_jti: r.get("refresh_jti"),
        created_at: r.get("created_at"),
        expires_at: r.get("expires_at"),
        revoked_at: r.get("revoked_at"),
    }
}

/// Default PostgreSQL implementation of `SessionRepository`.
///
/// Timestamps are stored as `TIMESTAMPTZ` and exchanged as epoch seconds.
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn insert(&self, session: &Session) -> AuthResult<()> {
        sqlx::query(
            "INSERT INTO auth_sessions
                 (id, user_id, device_id, ip_address, user_agent, refresh_jti, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, to_timestamp($7), to_timestamp($8))",
        )
        .bind(&session.id)
        .bind(session.user_id)
        .bind(&session.device_id)
        .bind(&session.ip_address)
        .bind(&session.user_agent)
        .bind(&session.refresh_jti)
        .bind(session.created_at as f64)
        .bind(session.expires_at as f64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, session_id: &str, user_id: UserId) -> AuthResult<Option<Session>> {
        let row = sqlx::query(
            "SELECT id, user_id, device_id, ip_address, user_agent, refresh_jti,
                    EXTRACT(EPOCH FROM created_at)::BIGINT AS created_at,
                    EXTRACT(EPOCH FROM expires_at)::BIGINT AS expires_at,
                    EXTRACT(EPOCH FROM revoked_at)::BIGINT AS revoked_at
             FROM auth_sessions
             WHERE id = $1 AND user_id = $2",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(session_from_row))
    }

    async fn revoke(&self, session_id: &str, now: i64) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE auth_sessions SET revoked_at = to_timestamp($2)
             WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(session_id)
        .bind(now as f64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn rotate_refresh(
        &self,
        session_id: &str,
        expected: Option<&str>,
        new_jti: &str,
    ) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE auth_sessions SET refresh_jti = $3
             WHERE id = $1 AND revoked_at IS NULL AND refresh_jti IS NOT DISTINCT FROM $2",
        )
        .bind(session_id)
        .bind(expected)
        .bind(new_jti)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn purge_expired(&self, before: i64) -> AuthResult<u64> {
        let result = sqlx::query("DELETE FROM auth_sessions WHERE expires_at < to_timestamp($1)")
            .bind(before as f64)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// In-memory `UserRepository` enforcing the same case-insensitive uniqueness
/// as the PostgreSQL schema
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<UserId, User>>,
    next_id: Mutex<UserId>,
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
        }
    }

    /// Preload a user
    pub fn with_user(mut self, user: User) -> Self {
        let next_id = self.next_id.get_mut();
        *next_id = (*next_id).max(user.id + 1);
        self.users.get_mut().insert(user.id, user);
        self
    }

    /// Grant or revoke admin rights
    pub async fn set_admin(&self, user_id: UserId, is_admin: bool) {
        if let Some(user) = self.users.lock().await.get_mut(&user_id) {
            user.is_admin = is_admin;
        }
    }

    /// Soft-delete a user
    pub async fn soft_delete(&self, user_id: UserId) {
        if let Some(user) = self.users.lock().await.get_mut(&user_id) {
            user.deleted_at = Some(Utc::now());
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let users = self.users.lock().await;
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        let users = self.users.lock().await;
        Ok(users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        Ok(self.users.lock().await.get(&user_id).cloned())
    }

    async fn insert(&self, new_user: &NewUser) -> AuthResult<User> {
        let mut users = self.users.lock().await;

        if users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&new_user.email))
        {
            return Err(AuthError::EmailTaken);
        }
        if users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(&new_user.username))
        {
            return Err(AuthError::HandleTaken);
        }

        let mut next_id = self.next_id.lock().await;
        let id = *next_id;
        *next_id += 1;

        let user = User {
            id,
            username: new_user.username.clone(),
            email: new_user.email.clone(),
            password_hash: new_user.password_hash.clone(),
            display_name: new_user.display_name.clone(),
            is_verified: false,
            is_admin: false,
            created_at: Utc::now(),
            deleted_at: None,
        };
        users.insert(id, user.clone());

        Ok(user)
    }
}

/// In-memory `SessionRepository`
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: Mutex<HashMap<String, Session>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session by id regardless of owner
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.lock().await.get(session_id).cloned()
    }

    /// Number of stored sessions
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert(&self, session: &Session) -> AuthResult<()> {
        self.sessions
            .lock()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn find(&self, session_id: &str, user_id: UserId) -> AuthResult<Option<Session>> {
        Ok(self
            .sessions
            .lock()
            .await
            .get(session_id)
            .filter(|s| s.user_id == user_id)
            .cloned())
    }

    async fn revoke(&self, session_id: &str, now: i64) -> AuthResult<bool> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(session_id) {
            Some(session) if session.revoked_at.is_none() => {
                session.revoked_at = Some(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn rotate_refresh(
        &self,
        session_id: &str,
        expected: Option<&str>,
        new_jti: &str,
    ) -> AuthResult<bool> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(session_id) {
            Some(session)
                if session.revoked_at.is_none() && session.refresh_jti.as_deref() == expected =>
            {
                session.refresh_jti = Some(new_jti.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn purge_expired(&self, before: i64) -> AuthResult<u64> {
        let mut sessions = self.sessions.lock().await;
        let count = sessions.len();
        sessions.retain(|_, s| s.expires_at >= before);
        Ok((count - sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            display_name: username.to_string(),
        }
    }

    fn session(id: &str, user_id: UserId, expires_at: i64) -> Session {
        Session {
            id: id.to_string(),
            user_id,
            device_id: "device".to_string(),
            ip_address: "127.0.0.1".to_string(),
            user_agent: None,
            refresh_jti: Some("jti-0".to_string()),
            created_at: 0,
            expires_at,
            revoked_at: None,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids() {
        let repo = InMemoryUserRepository::new();

        let first = repo.insert(&new_user("alice", "a@x.com")).await.unwrap();
        let second = repo.insert(&new_user("bob", "b@x.com")).await.unwrap();

        assert_eq!(first.id, 1, "First user should have ID 1");
        assert_eq!(second.id, 2, "Second user should have ID 2");
        assert!(!first.is_admin);
    }

    #[tokio::test]
    async fn test_uniqueness_is_case_insensitive() {
        let repo = InMemoryUserRepository::new();
        repo.insert(&new_user("alice", "a@x.com")).await.unwrap();

        assert!(matches!(
            repo.insert(&new_user("other", "A@X.com")).await,
            Err(AuthError::EmailTaken)
        ));
        assert!(matches!(
            repo.insert(&new_user("ALICE", "c@x.com")).await,
            Err(AuthError::HandleTaken)
        ));
    }

    #[tokio::test]
    async fn test_lookups() {
        let repo = InMemoryUserRepository::new();
        let user = repo.insert(&new_user("alice", "a@x.com")).await.unwrap();

        assert_eq!(repo.find_by_email("A@x.com").await.unwrap().unwrap().id, user.id);
        assert_eq!(repo.find_by_username("Alice").await.unwrap().unwrap().id, user.id);
        assert!(repo.find_by_id(user.id).await.unwrap().is_some());
        assert!(repo.find_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_with_user_and_flags() {
        let preloaded = User {
            id: 100,
            username: "preloaded".to_string(),
            email: "p@x.com".to_string(),
            password_hash: "hash".to_string(),
            display_name: "Preloaded".to_string(),
            is_verified: true,
            is_admin: false,
            created_at: Utc::now(),
            deleted_at: None,
        };
        let repo = InMemoryUserRepository::new().with_user(preloaded);

        repo.set_admin(100, true).await;
        repo.soft_delete(100).await;
        let found = repo.find_by_id(100).await.unwrap().unwrap();
        assert!(found.is_admin);
        assert!(found.is_deleted());

        // Ids continue after preloaded rows
        let next = repo.insert(&new_user("next", "n@x.com")).await.unwrap();
        assert_eq!(next.id, 101);
    }

    #[tokio::test]
    async fn test_session_find_is_scoped_to_owner() {
        let repo = InMemorySessionRepository::new();
        repo.insert(&session("s1", 1, 100)).await.unwrap();

        assert!(repo.find("s1", 1).await.unwrap().is_some());
        assert!(repo.find("s1", 2).await.unwrap().is_none());
        assert!(repo.find("missing", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let repo = InMemorySessionRepository::new();
        repo.insert(&session("s1", 1, 100)).await.unwrap();

        assert!(repo.revoke("s1", 10).await.unwrap());
        assert!(!repo.revoke("s1", 20).await.unwrap());
        assert_eq!(repo.get("s1").await.unwrap().revoked_at, Some(10));
        assert!(!repo.revoke("missing", 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_rotate_refresh_compare_and_swap() {
        let repo = InMemorySessionRepository::new();
        repo.insert(&session("s1", 1, 100)).await.unwrap();

        assert!(repo.rotate_refresh("s1", Some("jti-0"), "jti-1").await.unwrap());
        // Stale expectation loses
        assert!(!repo.rotate_refresh("s1", Some("jti-0"), "jti-2").await.unwrap());
        assert_eq!(repo.get("s1").await.unwrap().refresh_jti.as_deref(), Some("jti-1"));

        repo.revoke("s1", 5).await.unwrap();
        assert!(!repo.rotate_refresh("s1", Some("jti-1"), "jti-3").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let repo = InMemorySessionRepository::new();
        repo.insert(&session("old", 1, 50)).await.unwrap();
        repo.insert(&session("new", 1, 500)).await.unwrap();

        assert_eq!(repo.purge_expired(100).await.unwrap(), 1);
        assert_eq!(repo.len().await, 1);
        assert!(repo.get("new").await.is_some());
    }
}
