//! Authentication error types.

use thiserror::Error;

use crate::db::timeouts::TimeoutError;

/// How an error is surfaced to the boundary layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed request, duplicate email/handle, validation failure
    ClientInput,
    /// Bad credentials, bad token, bad session, fingerprint mismatch
    Authentication,
    /// Throttled; carries a retry-after hint
    RateLimited,
    /// A store was unreachable or failed; retryable
    Infrastructure,
}

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Rate limit exceeded
    #[error("Too many requests, retry after {retry_after} seconds")]
    TooManyRequests { retry_after: u64 },

    /// Unknown email or wrong password; the two are never distinguished
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Email already registered
    #[error("Email already registered")]
    EmailTaken,

    /// Username already taken
    #[error("Username already taken")]
    HandleTaken,

    /// Token missing, malformed or carrying a bad signature
    #[error("Invalid token")]
    InvalidToken,

    /// Token expired
    #[error("Token has expired")]
    Expired,

    /// Access token used where a refresh token is required, or vice versa
    #[error("Invalid token type")]
    WrongTokenType,

    /// Session not found, revoked, expired or superseded
    #[error("Session not found or revoked")]
    SessionInvalid,

    /// Request fingerprint does not match the token's device
    #[error("Token fingerprint mismatch")]
    FingerprintMismatch,

    /// User not found
    #[error("User not found")]
    NotFound,

    /// Caller lacks the privileges for the operation
    #[error("Admin privileges required")]
    Forbidden,

    /// Request input failed validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A dependency timed out or is unreachable
    #[error("Service temporarily unavailable: {0}")]
    Unavailable(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Token signing failed
    #[error("Token encoding failed: {0}")]
    TokenEncoding(String),
}

impl AuthError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::TooManyRequests { .. } => "too_many_requests",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::EmailTaken => "email_taken",
            AuthError::HandleTaken => "handle_taken",
            AuthError::InvalidToken => "invalid_token",
            AuthError::Expired => "token_expired",
            AuthError::WrongTokenType => "wrong_token_type",
            AuthError::SessionInvalid => "session_invalid",
            AuthError::FingerprintMismatch => "fingerprint_mismatch",
            AuthError::NotFound => "not_found",
            AuthError::Forbidden => "forbidden",
            AuthError::Validation(_) => "validation_failed",
            AuthError::Unavailable(_) => "service_unavailable",
            AuthError::Database(_) => "service_unavailable",
            AuthError::HashingFailed => "internal_error",
            AuthError::TokenEncoding(_) => "internal_error",
        }
    }

    /// Boundary category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            AuthError::Validation(_) | AuthError::EmailTaken | AuthError::HandleTaken => {
                ErrorCategory::ClientInput
            }
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::Expired
            | AuthError::WrongTokenType
            | AuthError::SessionInvalid
            | AuthError::FingerprintMismatch => ErrorCategory::Authentication,
            AuthError::TooManyRequests { .. } => ErrorCategory::RateLimited,
            // Authorization and lookup failures are reported to the caller as-is
            AuthError::Forbidden | AuthError::NotFound => ErrorCategory::ClientInput,
            AuthError::Unavailable(_)
            | AuthError::Database(_)
            | AuthError::HashingFailed
            | AuthError::TokenEncoding(_) => ErrorCategory::Infrastructure,
        }
    }

    /// Code exposed to clients.
    ///
    /// Every authentication failure except a failed login collapses to
    /// `unauthenticated`, so callers cannot learn which check rejected them.
    pub fn public_code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => self.code(),
            _ if self.category() == ErrorCategory::Authentication => "unauthenticated",
            _ => self.code(),
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Infrastructure errors are sanitized to prevent information disclosure
    /// about the internal system structure.
    pub fn client_message(&self) -> String {
        match self.category() {
            ErrorCategory::Infrastructure => {
                "Service temporarily unavailable, please retry".to_string()
            }
            ErrorCategory::Authentication if !matches!(self, AuthError::InvalidCredentials) => {
                "Authentication required".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Infrastructure
    }

    /// Seconds to wait before retrying, for rate-limit errors
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            AuthError::TooManyRequests { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<TimeoutError<AuthError>> for AuthError {
    fn from(err: TimeoutError<AuthError>) -> Self {
        match err {
            TimeoutError::Timeout(duration) => {
                AuthError::Unavailable(format!("store call timed out after {:?}", duration))
            }
            TimeoutError::Inner(inner) => inner,
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
