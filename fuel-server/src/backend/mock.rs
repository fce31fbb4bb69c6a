//! In-memory backend for testing without API access.
//!
//! Serves rows as if they came from the paginated rows API, counts requests,
//! and can inject latency and failures.

use std::path::Path;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::json;

use super::error::BackendError;
use super::pagination::{PageSource, Row};

#[derive(Debug, Clone)]
enum Data {
    /// Fixed pages, served verbatim regardless of the requested size.
    Pages(Vec<Vec<Row>>),
    /// A flat row list, sliced by the requested page size.
    Rows(Vec<Row>),
    /// Every page is full; never terminates on its own.
    Endless(usize),
}

/// Mock backend that serves rows from memory.
#[derive(Debug)]
pub struct MockBackend {
    data: RwLock<Data>,
    calls: AtomicUsize,
    failing: AtomicBool,
    fail_from_page: Option<u32>,
    transient_failures: AtomicU32,
    latency: Option<Duration>,
}

impl MockBackend {
    fn with_data(data: Data) -> Self {
        Self {
            data: RwLock::new(data),
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            fail_from_page: None,
            transient_failures: AtomicU32::new(0),
            latency: None,
        }
    }

    /// Serve these pages in order (page 1 is `pages[0]`); later pages are empty.
    pub fn from_pages(pages: Vec<Vec<Row>>) -> Self {
        Self::with_data(Data::Pages(pages))
    }

    /// Serve a flat row list, paged by the caller's page size.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self::with_data(Data::Rows(rows))
    }

    /// A backend that always returns `rows_per_page` rows.
    pub fn endless(rows_per_page: usize) -> Self {
        Self::with_data(Data::Endless(rows_per_page))
    }

    /// Load a JSON array of rows from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BackendError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            BackendError::Unavailable(format!("failed to read mock data {}: {e}", path.display()))
        })?;
        let rows: Vec<Row> = serde_json::from_str(&json).map_err(|e| BackendError::Json {
            message: format!("failed to parse {}: {e}", path.display()),
        })?;
        Ok(Self::from_rows(rows))
    }

    /// Every page from `page` onwards fails.
    pub fn fail_from_page(mut self, page: u32) -> Self {
        self.fail_from_page = Some(page);
        self
    }

    /// The next `n` requests fail with a transient error.
    pub fn fail_times(self, n: u32) -> Self {
        self.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Delay every response.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Toggle total failure at runtime.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Replace the served rows.
    pub fn set_rows(&self, rows: Vec<Row>) {
        if let Ok(mut data) = self.data.write() {
            *data = Data::Rows(rows);
        }
    }

    /// Number of page requests received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn page(&self, page: u32, page_size: u32) -> Vec<Row> {
        let Ok(data) = self.data.read() else {
            return Vec::new();
        };
        let index = page.saturating_sub(1) as usize;
        match &*data {
            Data::Pages(pages) => pages.get(index).cloned().unwrap_or_default(),
            Data::Rows(rows) => rows
                .iter()
                .skip(index * page_size as usize)
                .take(page_size as usize)
                .cloned()
                .collect(),
            Data::Endless(n) => (0..*n)
                .map(|i| json!({ "id": format!("endless-{page}-{i}") }))
                .collect(),
        }
    }
}

impl PageSource for MockBackend {
    fn fetch_page(&self, page: u32, page_size: u32) -> BoxFuture<'_, Result<Vec<Row>, BackendError>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }

            if self.failing.load(Ordering::SeqCst) {
                return Err(BackendError::Unavailable("mock backend is failing".to_string()));
            }

            let remaining = self.transient_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.transient_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(BackendError::RateLimited);
            }

            if self.fail_from_page.is_some_and(|p| page >= p) {
                return Err(BackendError::Api {
                    status: 503,
                    message: format!("mock failure on page {page}"),
                });
            }

            Ok(self.page(page, page_size))
        }
        .boxed()
    }
}
