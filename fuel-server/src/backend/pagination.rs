//! Page-by-page retrieval of backend rows.
//!
//! Pages are requested in order starting at 1 until a terminal page is seen:
//! one that is empty or shorter than the requested page size. A page budget
//! bounds retrieval even when the backend never returns a terminal page.

use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use super::error::BackendError;
use super::retry::retry_with_backoff;

/// A raw backend row, before normalization.
pub type Row = serde_json::Value;

/// Anything that can serve one page of rows.
///
/// Implemented by the HTTP [`BackendClient`](super::BackendClient) and by
/// [`MockBackend`](super::MockBackend) for tests and offline development.
pub trait PageSource: Send + Sync {
    /// Fetch page `page` (1-based) holding at most `page_size` rows.
    fn fetch_page(&self, page: u32, page_size: u32) -> BoxFuture<'_, Result<Vec<Row>, BackendError>>;
}

/// Configuration for pagination.
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    /// Rows requested per page.
    pub page_size: u32,

    /// Maximum number of pages fetched in one pass.
    pub max_pages: u32,

    /// Additional attempts per page on transient errors.
    pub max_retries: u32,

    /// Base delay for exponential back-off between attempts.
    pub backoff_base_ms: u64,
}

impl PaginationConfig {
    pub fn new(page_size: u32, max_pages: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
            ..Self::default()
        }
    }

    pub fn with_retries(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.backoff_base_ms = backoff_base_ms;
        self
    }
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 50,
            max_retries: 2,
            backoff_base_ms: 500,
        }
    }
}

/// Outcome of a pagination pass.
///
/// Rows from every successfully fetched page are kept even when a later
/// page fails; `error` then carries the failure.
#[derive(Debug)]
pub struct PageFetch {
    pub rows: Vec<Row>,

    /// Number of pages successfully fetched.
    pub pages: u32,

    /// The page budget ran out before a terminal page was seen.
    pub truncated: bool,

    pub error: Option<BackendError>,
}

impl PageFetch {
    /// All pages were retrieved and a terminal page was observed.
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && !self.truncated
    }
}

/// Aggregates paginated rows from a [`PageSource`].
#[derive(Clone)]
pub struct PaginationFetcher {
    source: Arc<dyn PageSource>,
    config: PaginationConfig,
}

impl PaginationFetcher {
    pub fn new(source: Arc<dyn PageSource>, config: PaginationConfig) -> Self {
        Self { source, config }
    }

    /// Fetch pages until a terminal page, an error, or the page budget.
    pub async fn fetch_all(&self) -> PageFetch {
        let page_size = self.config.page_size.max(1);
        let max_pages = self.config.max_pages.max(1);
        let mut rows = Vec::new();
        let mut pages = 0;

        for page in 1..=max_pages {
            let result = retry_with_backoff(self.config.max_retries, self.config.backoff_base_ms, || {
                self.source.fetch_page(page, page_size)
            })
            .await;

            match result {
                Ok(batch) => {
                    let len = batch.len();
                    rows.extend(batch);
                    pages = page;
                    debug!(page, len, total = rows.len(), "fetched page");

                    if len < page_size as usize {
                        return PageFetch {
                            rows,
                            pages,
                            truncated: false,
                            error: None,
                        };
                    }
                }
                Err(e) => {
                    warn!(
                        page,
                        rows_kept = rows.len(),
                        error = %e,
                        "pagination stopped by error, keeping partial rows"
                    );
                    return PageFetch {
                        rows,
                        pages,
                        truncated: false,
                        error: Some(e),
                    };
                }
            }
        }

        warn!(max_pages, rows = rows.len(), "page budget exhausted before a terminal page");
        PageFetch {
            rows,
            pages,
            truncated: true,
            error: None,
        }
    }
}
