//! Store error types.

use serde::Serialize;

use crate::backend::{BackendError, ErrorKind};

/// Error descriptor attached to a fetch outcome.
///
/// Fetches never fail outright: this travels alongside live, partial or
/// fallback data so the caller can decide how to message it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("timeout: {message}")]
    Timeout { message: String },

    #[error("parse error: {message}")]
    Parse { message: String },

    /// Some pages arrived before the backend failed.
    #[error("partial data after {pages} page(s): {cause}")]
    Partial { pages: u32, cause: String },

    #[error("backend returned no usable stations")]
    EmptyDataset,

    #[error("store has been shut down")]
    ShutDown,
}

impl SyncError {
    pub fn from_backend(err: &BackendError) -> Self {
        let message = err.to_string();
        match err.kind() {
            ErrorKind::Network => SyncError::Network { message },
            ErrorKind::Timeout => SyncError::Timeout { message },
            ErrorKind::Parse => SyncError::Parse { message },
        }
    }
}

/// Errors from the on-disk snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("cache error: {message}")]
    Cache { message: String },
}
