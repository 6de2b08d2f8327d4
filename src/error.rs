use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

use crate::models::ErrorBody;

/// Request-level failures. Both are terminal for the current request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Credential missing, empty, or not equal to the configured key (401).
    #[error("{0}")]
    Unauthorized(String),

    /// The policy's window is full for this identity (429). Nothing was recorded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded {
        policy: &'static str,
        retry_after: Duration,
    },
}

impl GatewayError {
    pub fn unauthorized() -> Self {
        Self::Unauthorized("Invalid or missing API key".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

// Whole seconds, rounded up, never zero
pub fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let limited = match &self {
            Self::RateLimitExceeded {
                policy,
                retry_after,
            } => Some((*policy, retry_after_secs(*retry_after))),
            Self::Unauthorized(_) => None,
        };

        let body = ErrorBody {
            detail: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();

        if let Some((policy, secs)) = limited {
            let headers = response.headers_mut();
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
            headers.insert("x-ratelimit-policy", HeaderValue::from_static(policy));
        }
        response
    }
}

/// Startup failures while building settings or limiter policies.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: expected {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("invalid rate limit policy: {0}")]
    InvalidLimiter(String),

    #[error("failed to read env file: {0}")]
    EnvFile(#[from] dotenvy::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Remote secret store failures. Logged and swallowed by the loader.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("secret binary is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("secret binary is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("secret {0} has no value")]
    Empty(String),
}
