//! HTTP client for the tabular rows API.

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::Value;

use super::error::BackendError;
use super::pagination::{PageSource, Row};

/// Default base URL for the rows API.
const DEFAULT_BASE_URL: &str = "https://api.baserow.io";

/// Configuration for the backend client.
#[derive(Debug, Clone)]
pub struct BackendClientConfig {
    /// API token sent as `Authorization: Token <token>`
    pub token: String,
    /// Base URL for the API
    pub base_url: String,
    /// Table holding the station rows
    pub table_id: u64,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl BackendClientConfig {
    /// Create a new config for the given token and table.
    pub fn new(token: impl Into<String>, table_id: u64) -> Self {
        Self {
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            table_id,
            timeout_secs: 15,
        }
    }

    /// Set a custom base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }
}

/// Client for the paginated rows API.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
    table_id: u64,
    timeout_secs: u64,
}

impl BackendClient {
    /// Create a new backend client.
    pub fn new(config: BackendClientConfig) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();

        if !config.token.is_empty() {
            let auth = HeaderValue::from_str(&format!("Token {}", config.token)).map_err(|_| {
                BackendError::Api {
                    status: 0,
                    message: "Invalid API token format".to_string(),
                }
            })?;
            headers.insert(AUTHORIZATION, auth);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url,
            table_id: config.table_id,
            timeout_secs: config.timeout_secs,
        })
    }

    fn rows_url(&self) -> String {
        format!(
            "{}/api/database/rows/table/{}/",
            self.base_url, self.table_id
        )
    }

    /// Fetch one page of rows.
    ///
    /// The backend answers 404 for a page past the end; that is reported as
    /// an empty (terminal) page rather than an error.
    pub async fn fetch_rows_page(&self, page: u32, page_size: u32) -> Result<Vec<Row>, BackendError> {
        let response = self
            .http
            .get(self.rows_url())
            .query(&[
                ("page", page.to_string()),
                ("size", page_size.to_string()),
                ("user_field_names", "true".to_string()),
            ])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(BackendError::Unauthorized);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::RateLimited);
        }

        if status == reqwest::StatusCode::NOT_FOUND && page > 1 {
            return Ok(Vec::new());
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: body.chars().take(500).collect(),
            });
        }

        let body = response.text().await.map_err(|e| self.map_send_error(e))?;

        let value: Value = serde_json::from_str(&body).map_err(|e| BackendError::Json {
            message: e.to_string(),
        })?;

        extract_rows(value)
    }

    fn map_send_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            BackendError::Http(e)
        }
    }
}

impl PageSource for BackendClient {
    fn fetch_page(&self, page: u32, page_size: u32) -> BoxFuture<'_, Result<Vec<Row>, BackendError>> {
        self.fetch_rows_page(page, page_size).boxed()
    }
}

/// Pull the rows array out of a response body.
///
/// Accepts `{"results": [...]}`, `{"rows": [...]}`, `{"data": [...]}` or a
/// bare array.
fn extract_rows(body: Value) -> Result<Vec<Row>, BackendError> {
    match body {
        Value::Array(rows) => Ok(rows),
        Value::Object(mut map) => ["results", "rows", "data"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(rows)) => Some(rows),
                _ => None,
            })
            .ok_or_else(|| BackendError::Json {
                message: "response has no rows array".to_string(),
            }),
        _ => Err(BackendError::Json {
            message: "response is neither an object nor an array".to_string(),
        }),
    }
}
