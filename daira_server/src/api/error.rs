//! Mapping of authentication errors onto HTTP responses.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use daira_auth::auth::{AuthError, ErrorCategory};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Handler error wrapping [`AuthError`]
#[derive(Debug)]
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AuthError::EmailTaken | AuthError::HandleTaken => StatusCode::CONFLICT,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            err => match err.category() {
                ErrorCategory::ClientInput => StatusCode::BAD_REQUEST,
                ErrorCategory::Authentication => StatusCode::UNAUTHORIZED,
                ErrorCategory::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                ErrorCategory::Infrastructure => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let err = self.0;

        if err.is_retryable() {
            tracing::error!(error = %err, "Request failed on an unavailable dependency");
        }

        let retry_after = err.retry_after();
        let body = ErrorResponse {
            error: err.public_code().to_string(),
            message: err.client_message(),
            retry_after,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
