//! The realtime update channel.
//!
//! A transport task holds one push subscription and feeds parsed updates
//! into a bounded queue; a consumer task drains the queue into the store
//! and broadcasts what happened. Connection state is published on a watch
//! channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::RealtimeUpdate;
use crate::store::{MergeOutcome, StationDataStore};

use super::error::RealtimeError;
use super::event::parse_event;
use super::sse::EventSource;

/// Subscription lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Error => "error",
        }
    }
}

/// Configuration for the realtime channel.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// First reconnect delay; doubles on each consecutive failure.
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Updates buffered between transport and consumer.
    pub queue_capacity: usize,
    /// Events buffered per subscriber before it starts lagging.
    pub broadcast_capacity: usize,
}

impl RealtimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            queue_capacity: 1024,
            broadcast_capacity: 256,
        }
    }
}

/// An update after it went through the store.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedUpdate {
    pub update: RealtimeUpdate,
    pub outcome: MergeOutcome,
}

/// Counters since the channel started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeStats {
    /// Events read off the wire.
    pub received: u64,
    /// Malformed events discarded.
    pub dropped: u64,
    pub applied: u64,
    pub buffered: u64,
    pub stale: u64,
    /// Updates for unknown stations, or with no live snapshot to merge into.
    pub unmatched: u64,
    pub reconnects: u64,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    dropped: AtomicU64,
    applied: AtomicU64,
    buffered: AtomicU64,
    stale: AtomicU64,
    unmatched: AtomicU64,
    reconnects: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_outcome(&self, outcome: MergeOutcome) {
        let counter = match outcome {
            MergeOutcome::Applied => &self.applied,
            MergeOutcome::Buffered => &self.buffered,
            MergeOutcome::Stale => &self.stale,
            MergeOutcome::UnknownStation | MergeOutcome::NoSnapshot | MergeOutcome::Inactive => {
                &self.unmatched
            }
        };
        Self::bump(counter);
    }

    fn record_error(&self, error: &RealtimeError) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.to_string());
    }

    fn snapshot(&self) -> RealtimeStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RealtimeStats {
            received: load(&self.received),
            dropped: load(&self.dropped),
            applied: load(&self.applied),
            buffered: load(&self.buffered),
            stale: load(&self.stale),
            unmatched: load(&self.unmatched),
            reconnects: load(&self.reconnects),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

struct Shared {
    state: watch::Sender<ConnectionState>,
    shutdown: watch::Sender<bool>,
    events: broadcast::Sender<AppliedUpdate>,
    counters: Counters,
}

/// Handle to a running realtime subscription.
///
/// Cheap to clone. Must be created inside a tokio runtime.
#[derive(Clone)]
pub struct RealtimeChannel {
    shared: Arc<Shared>,
    /// Held across the joins in `disconnect` so concurrent callers queue up.
    tasks: Arc<tokio::sync::Mutex<Vec<JoinHandle<()>>>>,
}

impl RealtimeChannel {
    /// Connect to `source` and start merging its updates into `store`.
    pub fn start(
        source: Arc<dyn EventSource>,
        store: StationDataStore,
        config: RealtimeConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (shutdown, _) = watch::channel(false);
        let (events, _) = broadcast::channel(config.broadcast_capacity.max(1));
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));

        let shared = Arc::new(Shared {
            state,
            shutdown,
            events,
            counters: Counters::default(),
        });

        let transport = tokio::spawn(run_transport(source, tx, Arc::clone(&shared), config));
        let consumer = tokio::spawn(run_consumer(rx, store, Arc::clone(&shared)));

        Self {
            shared,
            tasks: Arc::new(tokio::sync::Mutex::new(vec![transport, consumer])),
        }
    }

    /// Watch the connection state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receive every update after the store has processed it.
    pub fn subscribe(&self) -> broadcast::Receiver<AppliedUpdate> {
        self.shared.events.subscribe()
    }

    pub fn stats(&self) -> RealtimeStats {
        self.shared.counters.snapshot()
    }

    /// Stop the subscription for good.
    ///
    /// Cancels a pending reconnect timer, closes the stream, lets the
    /// consumer finish what is already queued and waits for both tasks.
    /// Safe to call more than once, also concurrently: every caller returns
    /// only after both tasks have finished.
    pub async fn disconnect(&self) {
        self.shared.shutdown.send_replace(true);

        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "realtime task ended abnormally");
            }
        }

        self.shared.state.send_replace(ConnectionState::Disconnected);
        drop(tasks);
        info!("realtime channel disconnected");
    }
}

/// Delay before the reconnect after `current`.
pub(crate) fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

struct SessionEnd {
    /// The session got as far as an open stream.
    connected: bool,
    error: RealtimeError,
}

async fn run_transport(
    source: Arc<dyn EventSource>,
    tx: mpsc::Sender<RealtimeUpdate>,
    shared: Arc<Shared>,
    config: RealtimeConfig,
) {
    let mut shutdown = shared.shutdown.subscribe();
    let mut backoff = config.initial_backoff;

    loop {
        if *shutdown.borrow() || tx.is_closed() {
            break;
        }

        shared.state.send_replace(ConnectionState::Connecting);
        let session = tokio::select! {
            _ = shutdown.changed() => break,
            end = run_session(source.as_ref(), &tx, &shared) => end,
        };

        if session.connected {
            backoff = config.initial_backoff;
        }
        shared.counters.record_error(&session.error);
        shared.state.send_replace(ConnectionState::Error);
        warn!(
            error = %session.error,
            backoff_ms = backoff.as_millis() as u64,
            "realtime subscription lost, reconnecting"
        );

        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = next_backoff(backoff, config.max_backoff);
        Counters::bump(&shared.counters.reconnects);
    }

    debug!("realtime transport stopped");
}

async fn run_session(
    source: &dyn EventSource,
    tx: &mpsc::Sender<RealtimeUpdate>,
    shared: &Shared,
) -> SessionEnd {
    let mut stream = match source.connect().await {
        Ok(stream) => stream,
        Err(error) => {
            return SessionEnd {
                connected: false,
                error,
            };
        }
    };

    shared.state.send_replace(ConnectionState::Connected);
    info!("realtime subscription connected");

    loop {
        match stream.next().await {
            Some(Ok(event)) => {
                Counters::bump(&shared.counters.received);
                match parse_event(&event.data) {
                    Ok(update) => {
                        if tx.send(update).await.is_err() {
                            return SessionEnd {
                                connected: true,
                                error: RealtimeError::Closed,
                            };
                        }
                    }
                    Err(e) => {
                        Counters::bump(&shared.counters.dropped);
                        warn!(error = %e, "dropping realtime event");
                    }
                }
            }
            Some(Err(error)) => {
                return SessionEnd {
                    connected: true,
                    error,
                };
            }
            None => {
                return SessionEnd {
                    connected: true,
                    error: RealtimeError::Closed,
                };
            }
        }
    }
}

async fn run_consumer(
    mut rx: mpsc::Receiver<RealtimeUpdate>,
    store: StationDataStore,
    shared: Arc<Shared>,
) {
    while let Some(update) = rx.recv().await {
        let outcome = store.apply_update(update.clone()).await;
        debug!(station = %update.station_id, ?outcome, "realtime update processed");
        shared.counters.record_outcome(outcome);
        // Nobody listening is fine.
        let _ = shared.events.send(AppliedUpdate { update, outcome });
    }
    debug!("realtime consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, Normalizer, PaginationConfig, PaginationFetcher};
    use crate::realtime::MockEventSource;
    use crate::store::StoreConfig;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    async fn live_store() -> StationDataStore {
        let rows = vec![
            json!({ "id": "live-0", "name": "A", "lat": 51.02, "lng": 4.47, "diesel": 1.50 }),
            json!({ "id": "live-1", "name": "B", "lat": 50.63, "lng": 5.57, "diesel": 1.60 }),
        ];
        let fetcher = PaginationFetcher::new(
            Arc::new(MockBackend::from_rows(rows)),
            PaginationConfig::default().with_retries(0, 1),
        );
        let store = StationDataStore::new(fetcher, Normalizer::new(), StoreConfig::default());
        store.fetch_stations().await;
        store
    }

    fn fast() -> RealtimeConfig {
        RealtimeConfig::new().with_backoff(Duration::from_millis(10), Duration::from_millis(40))
    }

    fn payload(id: &str, fuel: &str, price: f64, ts: DateTime<Utc>) -> String {
        json!({ "rowId": id, "fuelType": fuel, "price": price, "timestamp": ts.to_rfc3339() })
            .to_string()
    }

    async fn eventually(what: &str, cond: impl Fn() -> bool) {
        let waited = tokio::time::timeout(Duration::from_secs(2), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(waited.is_ok(), "timed out waiting for {what}");
    }

    async fn wait_for_state(channel: &RealtimeChannel, state: ConnectionState) {
        let mut rx = channel.state();
        let reached = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == state))
            .await
            .is_ok_and(|r| r.is_ok());
        assert!(reached, "timed out waiting for {state:?}");
    }

    fn diesel(store_outcome: &crate::store::FetchOutcome, id: &str) -> Option<f64> {
        store_outcome
            .stations
            .iter()
            .find(|s| s.id.as_str() == id)
            .and_then(|s| s.fuel_prices.get("diesel"))
    }

    #[tokio::test]
    async fn applies_updates_and_broadcasts_them() {
        let store = live_store().await;
        let p = payload("live-0", "diesel", 1.99, Utc::now() + chrono::Duration::seconds(1));
        let source = Arc::new(MockEventSource::new().deliver_and_hold(&[p.as_str()]));

        let channel = RealtimeChannel::start(source, store.clone(), fast());
        let mut events = channel.subscribe();

        let applied = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(applied.outcome, MergeOutcome::Applied);
        assert_eq!(applied.update.station_id.as_str(), "live-0");

        assert_eq!(diesel(&store.fetch_stations().await, "live-0"), Some(1.99));
        assert_eq!(channel.current_state(), ConnectionState::Connected);

        let stats = channel.stats();
        assert_eq!(stats.received, 1);
        assert_eq!(stats.applied, 1);

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn malformed_events_are_dropped_without_closing() {
        let store = live_store().await;
        let good = payload("live-1", "diesel", 1.55, Utc::now() + chrono::Duration::seconds(1));
        let missing_fuel = r#"{"rowId": "live-1", "price": 1.2, "timestamp": 1700000000}"#;
        let source = Arc::new(
            MockEventSource::new().deliver_and_hold(&["not json", missing_fuel, good.as_str()]),
        );

        let channel = RealtimeChannel::start(source.clone(), store.clone(), fast());
        eventually("three events", || channel.stats().received == 3).await;
        eventually("one applied", || channel.stats().applied == 1).await;

        let stats = channel.stats();
        assert_eq!(stats.dropped, 2);
        assert_eq!(channel.current_state(), ConnectionState::Connected);
        assert_eq!(source.connects(), 1);
        assert_eq!(diesel(&store.fetch_stations().await, "live-1"), Some(1.55));

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn out_of_order_updates_keep_the_newest() {
        let store = live_store().await;
        let base = Utc::now() + chrono::Duration::seconds(10);
        let newer = payload("live-0", "diesel", 1.70, base + chrono::Duration::seconds(5));
        let older = payload("live-0", "diesel", 1.30, base + chrono::Duration::seconds(3));
        let source =
            Arc::new(MockEventSource::new().deliver_and_hold(&[newer.as_str(), older.as_str()]));

        let channel = RealtimeChannel::start(source, store.clone(), fast());
        eventually("both processed", || {
            let s = channel.stats();
            s.applied + s.stale == 2
        })
        .await;

        assert_eq!(channel.stats().stale, 1);
        assert_eq!(diesel(&store.fetch_stations().await, "live-0"), Some(1.70));

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn reconnects_after_failures() {
        let store = live_store().await;
        let source = Arc::new(MockEventSource::new().refuse("down").refuse("still down"));

        let channel = RealtimeChannel::start(source.clone(), store, fast());
        eventually("third attempt", || source.connects() == 3).await;
        wait_for_state(&channel, ConnectionState::Connected).await;

        let stats = channel.stats();
        assert_eq!(stats.reconnects, 2);
        assert!(stats.last_error.unwrap().contains("still down"));

        channel.disconnect().await;
    }

    #[tokio::test]
    async fn server_close_triggers_reconnect() {
        let store = live_store().await;
        let source = Arc::new(MockEventSource::new().deliver(&[]));

        let channel = RealtimeChannel::start(source.clone(), store, fast());
        eventually("second connection", || source.connects() == 2).await;
        wait_for_state(&channel, ConnectionState::Connected).await;

        assert_eq!(channel.stats().reconnects, 1);
        channel.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_cancels_pending_backoff() {
        let store = live_store().await;
        let source = Arc::new(MockEventSource::new().refuse("down"));
        let config = RealtimeConfig::new().with_backoff(Duration::from_secs(3600), Duration::from_secs(3600));

        let channel = RealtimeChannel::start(source.clone(), store, config);
        wait_for_state(&channel, ConnectionState::Error).await;

        let done = tokio::time::timeout(Duration::from_secs(1), channel.disconnect()).await;
        assert!(done.is_ok(), "disconnect waited for the backoff timer");
        assert_eq!(channel.current_state(), ConnectionState::Disconnected);
        assert_eq!(source.connects(), 1);
    }

    #[tokio::test]
    async fn disconnect_closes_open_subscription_for_good() {
        let store = live_store().await;
        let source = Arc::new(MockEventSource::new().deliver_and_hold(&[]));

        let channel = RealtimeChannel::start(source.clone(), store, fast());
        wait_for_state(&channel, ConnectionState::Connected).await;

        channel.disconnect().await;
        assert_eq!(channel.current_state(), ConnectionState::Disconnected);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(source.connects(), 1);
        assert_eq!(channel.current_state(), ConnectionState::Disconnected);

        // Second call is a no-op.
        channel.disconnect().await;
    }

    #[tokio::test]
    async fn concurrent_disconnects_both_wait_for_the_drain() {
        let store = live_store().await;
        let start = Utc::now() + chrono::Duration::seconds(1);
        let payloads: Vec<String> = (0..200)
            .map(|i| {
                let ts = start + chrono::Duration::milliseconds(i64::from(i));
                payload("live-0", "diesel", 1.0 + f64::from(i) / 1000.0, ts)
            })
            .collect();
        let refs: Vec<&str> = payloads.iter().map(String::as_str).collect();
        let source = Arc::new(MockEventSource::new().deliver_and_hold(&refs));
        let config = fast().with_queue_capacity(8);

        let channel = RealtimeChannel::start(source, store, config);
        eventually("first event", || channel.stats().received > 0).await;

        let processed = || {
            let stats = channel.stats();
            stats.applied + stats.buffered + stats.stale + stats.unmatched
        };
        let (first, second) = tokio::join!(
            async {
                channel.disconnect().await;
                (channel.current_state(), processed())
            },
            async {
                channel.disconnect().await;
                (channel.current_state(), processed())
            },
        );

        assert_eq!(first.0, ConnectionState::Disconnected);
        assert_eq!(second.0, ConnectionState::Disconnected);
        // Both callers saw the consumer finish: nothing is processed later.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(first.1, processed());
        assert_eq!(second.1, processed());
    }

    #[tokio::test]
    async fn touch_event_counts_as_applied() {
        let store = live_store().await;
        let ts = Utc::now() + chrono::Duration::seconds(1);
        let touch = json!({ "rowId": "live-1", "timestamp": ts.timestamp_millis() }).to_string();
        let source = Arc::new(MockEventSource::new().deliver_and_hold(&[touch.as_str()]));

        let channel = RealtimeChannel::start(source, store.clone(), fast());
        eventually("touch applied", || channel.stats().applied == 1).await;

        let outcome = store.fetch_stations().await;
        let station = outcome.stations.iter().find(|s| s.id.as_str() == "live-1").unwrap();
        assert_eq!(station.last_updated.timestamp_millis(), ts.timestamp_millis());
        assert_eq!(station.fuel_prices.get("diesel"), Some(1.60));

        channel.disconnect().await;
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let max = Duration::from_secs(60);
        let mut delay = Duration::from_secs(1);
        let mut seen = vec![delay.as_secs()];
        for _ in 0..8 {
            delay = next_backoff(delay, max);
            seen.push(delay.as_secs());
        }
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 32, 60, 60, 60]);
    }

    #[test]
    fn config_builder() {
        let config = RealtimeConfig::new()
            .with_backoff(Duration::from_secs(5), Duration::from_secs(1))
            .with_queue_capacity(0);
        assert_eq!(config.max_backoff, Duration::from_secs(5));
        assert_eq!(config.queue_capacity, 1);
    }
}
