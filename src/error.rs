//! Quotagate error types

use std::time::Duration;

/// Quotagate error types
#[derive(Debug, Clone, thiserror::Error)]
#[non_exhaustive]
pub enum GatewayError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limited by the upstream provider.
    ///
    /// `retry_after` is populated when the 429 response carried an integer
    /// `Retry-After` header. HTTP-date values are not interpreted.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// No registered provider can serve the request — either nothing matches
    /// the required capabilities, or every capable model is over quota, or
    /// every candidate was exhausted by retries and failover.
    #[error("no capable provider: {0}")]
    NoCapableProvider(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Usage-store failure. Never surfaced on the request path; the budget
    /// manager logs and continues.
    #[error("storage error: {0}")]
    Storage(String),
}

impl GatewayError {
    /// The upstream HTTP status associated with this error, if any.
    ///
    /// Feeds the retry classifier and the ingress error mapping; `None` for
    /// transport failures and everything that never reached an upstream.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::RateLimited { .. } => Some(429),
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// For `RateLimited` errors, the wait the provider asked for.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Json(err.to_string())
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(err: rusqlite::Error) -> Self {
        GatewayError::Storage(err.to_string())
    }
}

/// Result type alias for quotagate operations
pub type Result<T> = std::result::Result<T, GatewayError>;
