//! Persisted login sessions.

use std::sync::Arc;

use tracing::{debug, info};

use super::{
    device::generate_session_id,
    errors::AuthResult,
    models::{Session, SessionStatus, UserId},
};
use crate::db::{
    SessionRepository,
    timeouts::{RetryPolicy, with_retry, with_timeout},
};

/// Session lifecycle over a [`SessionRepository`].
///
/// Reads, inserts and revocations are retried within the configured bounds.
/// Refresh rotation is a compare-and-swap and gets exactly one attempt: a
/// retried swap that had already applied would look like token reuse.
#[derive(Clone)]
pub struct SessionStore {
    repo: Arc<dyn SessionRepository>,
    ttl_secs: i64,
    retry: RetryPolicy,
}

impl SessionStore {
    pub fn new(repo: Arc<dyn SessionRepository>, ttl_secs: i64, retry: RetryPolicy) -> Self {
        Self {
            repo,
            ttl_secs,
            retry,
        }
    }

    /// Create a session valid until `now + ttl` and return its id
    pub async fn create(
        &self,
        user_id: UserId,
        device_id: &str,
        ip: &str,
        user_agent: Option<&str>,
        now: i64,
    ) -> AuthResult<String> {
        let session = Session {
            id: generate_session_id(),
            user_id,
            device_id: device_id.to_string(),
            ip_address: ip.to_string(),
            user_agent: user_agent.map(str::to_string),
            refresh_jti: None,
            created_at: now,
            expires_at: now + self.ttl_secs,
            revoked_at: None,
        };

        let repo = &self.repo;
        with_retry(self.retry, || repo.insert(&session)).await?;

        debug!(user_id, "Session created");
        Ok(session.id)
    }

    /// Fetch the session row owned by `user_id`
    pub async fn load(&self, session_id: &str, user_id: UserId) -> AuthResult<Option<Session>> {
        let repo = &self.repo;
        Ok(with_retry(self.retry, || repo.find(session_id, user_id)).await?)
    }

    /// Validity of the session at `now`
    pub async fn validate(
        &self,
        session_id: &str,
        user_id: UserId,
        now: i64,
    ) -> AuthResult<SessionStatus> {
        Ok(self
            .load(session_id, user_id)
            .await?
            .map_or(SessionStatus::NotFound, |session| session.status_at(now)))
    }

    /// Revoke the session. Revoking twice, or revoking an unknown id, succeeds.
    pub async fn revoke(&self, session_id: &str, now: i64) -> AuthResult<()> {
        let repo = &self.repo;
        let revoked = with_retry(self.retry, || repo.revoke(session_id, now)).await?;

        if revoked {
            info!("Session revoked");
        }
        Ok(())
    }

    /// Accept `new_jti` as the session's refresh token if the current one is
    /// still `expected`. Returns false when another rotation won the race or
    /// the session was revoked.
    pub async fn rotate_refresh(
        &self,
        session_id: &str,
        expected: Option<&str>,
        new_jti: &str,
    ) -> AuthResult<bool> {
        Ok(with_timeout(
            self.retry.io_timeout,
            self.repo.rotate_refresh(session_id, expected, new_jti),
        )
        .await?)
    }

    /// Delete sessions that expired before `now`
    pub async fn purge_expired(&self, now: i64) -> AuthResult<u64> {
        let repo = &self.repo;
        let purged = with_retry(self.retry, || repo.purge_expired(now)).await?;

        if purged > 0 {
            info!(purged, "Expired sessions purged");
        }
        Ok(purged)
    }
}
