//! Backend error types.

/// Broad classification used for retry and fallback decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Timeout,
    Parse,
}

/// Errors that can occur when talking to the tabular rows backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request did not complete in time
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Authentication failed
    #[error("unauthorized: check FUEL_BACKEND_TOKEN")]
    Unauthorized,

    /// Rate limited by the backend
    #[error("rate limited by backend")]
    RateLimited,

    /// Backend returned an error status
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response JSON
    #[error("JSON parse error: {message}")]
    Json { message: String },

    /// Backend not reachable or not configured
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            BackendError::Http(e) if e.is_decode() => ErrorKind::Parse,
            BackendError::Timeout { .. } => ErrorKind::Timeout,
            BackendError::Json { .. } => ErrorKind::Parse,
            BackendError::Http(_)
            | BackendError::Unauthorized
            | BackendError::RateLimited
            | BackendError::Api { .. }
            | BackendError::Unavailable(_) => ErrorKind::Network,
        }
    }

    /// Whether retrying after a back-off delay might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::Http(e) => {
                e.is_timeout() || e.is_connect() || e.status().is_some_and(|s| s.is_server_error())
            }
            BackendError::Timeout { .. } | BackendError::RateLimited => true,
            BackendError::Api { status, .. } => *status >= 500,
            BackendError::Unavailable(_) => true,
            BackendError::Unauthorized | BackendError::Json { .. } => false,
        }
    }
}

/// A single backend row that could not be turned into a station.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("row {index}: {reason}")]
pub struct RowError {
    pub index: usize,
    pub reason: String,
}
