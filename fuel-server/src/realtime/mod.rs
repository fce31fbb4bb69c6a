//! Realtime price updates pushed over server-sent events.

mod channel;
mod error;
mod event;
mod mock;
mod sse;

pub use channel::{AppliedUpdate, ConnectionState, RealtimeChannel, RealtimeConfig, RealtimeStats};
pub use error::RealtimeError;
pub use event::parse_event;
pub use mock::MockEventSource;
pub use sse::{EventSource, EventStream, SseClient, SseDecoder, SseEvent};
