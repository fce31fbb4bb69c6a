//! Scripted event source for testing the realtime channel offline.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::BoxFuture;
use futures::stream;
use futures::{FutureExt, StreamExt};

use super::error::RealtimeError;
use super::sse::{EventSource, EventStream, SseEvent};

#[derive(Debug, Clone)]
enum Session {
    /// The connection attempt fails.
    Refuse(String),
    /// Deliver these payloads, then close or stay open.
    Deliver { payloads: Vec<String>, hang: bool },
}

/// Event source that plays back one scripted session per connection.
///
/// Once the script runs out, every further connection succeeds and stays
/// open without delivering anything.
#[derive(Debug, Default)]
pub struct MockEventSource {
    script: Mutex<VecDeque<Session>>,
    connects: AtomicUsize,
}

impl MockEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next connection attempt fails.
    pub fn refuse(self, reason: &str) -> Self {
        self.push(Session::Refuse(reason.to_string()))
    }

    /// Next connection delivers `payloads` and then the server closes it.
    pub fn deliver(self, payloads: &[&str]) -> Self {
        self.push(Session::Deliver {
            payloads: payloads.iter().map(|p| p.to_string()).collect(),
            hang: false,
        })
    }

    /// Next connection delivers `payloads` and stays open.
    pub fn deliver_and_hold(self, payloads: &[&str]) -> Self {
        self.push(Session::Deliver {
            payloads: payloads.iter().map(|p| p.to_string()).collect(),
            hang: true,
        })
    }

    fn push(self, session: Session) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(session);
        }
        self
    }

    /// Number of connection attempts so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl EventSource for MockEventSource {
    fn connect(&self) -> BoxFuture<'_, Result<EventStream, RealtimeError>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let session = self.script.lock().ok().and_then(|mut s| s.pop_front());

        let result = match session {
            Some(Session::Refuse(reason)) => Err(RealtimeError::Connect(reason)),
            Some(Session::Deliver { payloads, hang }) => {
                let events = stream::iter(payloads.into_iter().map(|p| Ok(SseEvent::message(p))));
                if hang {
                    Ok(events.chain(stream::pending::<Result<SseEvent, RealtimeError>>()).boxed())
                } else {
                    Ok(events.boxed())
                }
            }
            None => Ok(stream::pending::<Result<SseEvent, RealtimeError>>().boxed()),
        };
        async move { result }.boxed()
    }
}
