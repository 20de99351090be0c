use reqwest::StatusCode;
use thiserror::Error;

/// Failure talking to an upstream weather or geocoding API.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Transport failures, rate limiting and server errors are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ProviderError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            ProviderError::Malformed(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("weather provider unavailable: {0}")]
    ProviderUnavailable(#[from] ProviderError),
    #[error("cache store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),
    #[error("invalid location: {0}")]
    InvalidLocation(String),
    #[error("invalid date range: {0}")]
    InvalidDateRange(String),
    #[error("invalid reading: {0}")]
    InvalidReading(String),
}

pub type Result<T> = std::result::Result<T, Error>;
