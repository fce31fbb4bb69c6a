//! Server-sent events transport.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tracing::debug;

use super::error::RealtimeError;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, if the server named the event.
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    pub fn message(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
            id: None,
        }
    }
}

/// Longest line the decoder buffers while waiting for its terminator.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Open subscription: events until the server closes or the transport fails.
pub type EventStream = BoxStream<'static, Result<SseEvent, RealtimeError>>;

/// Something that can open a push subscription.
pub trait EventSource: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<EventStream, RealtimeError>>;
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes may arrive split anywhere, including inside a line or a UTF-8
/// sequence; incomplete lines are buffered until their terminator arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completed.
    ///
    /// Fails once an unterminated line grows past [`MAX_LINE_BYTES`]; the
    /// buffered bytes are discarded.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, RealtimeError> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_LINE_BYTES {
            let pending = self.buffer.len();
            self.buffer.clear();
            return Err(RealtimeError::Protocol {
                reason: format!("unterminated line of {pending} bytes"),
            });
        }
        Ok(events)
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event,
            data,
            id: self.id.clone(),
        })
    }
}

/// HTTP event source reading `text/event-stream` with reqwest.
#[derive(Debug, Clone)]
pub struct SseClient {
    client: reqwest::Client,
    url: String,
}

impl SseClient {
    pub fn new(url: impl Into<String>) -> Result<Self, RealtimeError> {
        // No overall timeout: the body is expected to stay open.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn open(&self) -> Result<EventStream, RealtimeError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RealtimeError::Status {
                status: status.as_u16(),
            });
        }
        debug!(url = %self.url, "event stream opened");

        let mut decoder = SseDecoder::new();
        let events = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => match decoder.feed(&bytes) {
                    Ok(events) => events.into_iter().map(Ok).collect::<Vec<_>>(),
                    Err(e) => vec![Err(e)],
                },
                Err(e) => vec![Err(RealtimeError::Http(e))],
            })
            .flat_map(stream::iter);

        Ok(events.boxed())
    }
}

impl EventSource for SseClient {
    fn connect(&self) -> BoxFuture<'_, Result<EventStream, RealtimeError>> {
        self.open().boxed()
    }
}
