//! Realtime channel error types.

/// Errors on the realtime push subscription.
///
/// None of these reach consumers as failures; they drive the reconnect
/// policy and show up as the `error` connection state.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    /// HTTP request or body stream failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status
    #[error("unexpected status {status} from event stream")]
    Status { status: u16 },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("event stream closed by server")]
    Closed,

    /// The stream broke the event-stream framing
    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    /// A single event could not be turned into an update
    #[error("malformed event: {reason}")]
    Malformed { reason: String },
}

impl RealtimeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        RealtimeError::Malformed {
            reason: reason.into(),
        }
    }
}
