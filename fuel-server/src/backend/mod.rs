//! Remote tabular backend access.
//!
//! Station rows live in a paginated rows API. This module fetches them page
//! by page and normalizes the backend's drifting field names into canonical
//! [`Station`](crate::domain::Station) records.

mod client;
mod error;
mod mock;
mod normalize;
mod pagination;
mod retry;

pub use client::{BackendClient, BackendClientConfig};
pub use error::{BackendError, ErrorKind, RowError};
pub use mock::MockBackend;
pub use normalize::{Field, Normalized, Normalizer};
pub use pagination::{PageFetch, PageSource, PaginationConfig, PaginationFetcher, Row};

pub(crate) use normalize::value_as_timestamp;
