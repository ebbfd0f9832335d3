use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::http::HttpError;

/// Errors that can occur when talking to the hosting service.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Non-success response that is not otherwise classified.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Primary quota exhausted.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Abuse-detection throttle ("secondary rate limit").
    #[error("Secondary rate limit hit")]
    SecondaryRateLimited { retry_after: Option<u64> },

    /// Repository or other resource no longer exists.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Network error: {message}")]
    Network { message: String },

    /// Response body did not match the expected shape.
    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PlatformError {
    #[inline]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    #[inline]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Primary or secondary throttling; both are worth waiting out.
    #[inline]
    pub fn is_throttled(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::SecondaryRateLimited { .. }
        )
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<HttpError> for PlatformError {
    fn from(err: HttpError) -> Self {
        Self::network(err.to_string())
    }
}

/// First line of an error message, for log lines.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for hosting-service operations.
pub type Result<T> = std::result::Result<T, PlatformError>;
