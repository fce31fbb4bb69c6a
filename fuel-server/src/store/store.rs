//! The station data store.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::backend::{Normalizer, PageFetch, PaginationFetcher};
use crate::domain::{RealtimeUpdate, Station};

use super::config::StoreConfig;
use super::error::SyncError;
use super::fallback::fallback_stations;
use super::ledger::PendingLedger;
use super::persist::SnapshotFile;
use super::snapshot::{CacheSnapshot, FetchStats, SnapshotCache, Source, StationSet};

/// Result of [`StationDataStore::fetch_stations`].
///
/// Always carries a usable station list; `error` describes what went wrong
/// when the list is partial or fallback data.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub stations: StationSet,
    pub source: Source,
    pub error: Option<SyncError>,
    pub fetched_at: DateTime<Utc>,
    pub stats: FetchStats,
    /// Served from a fresh snapshot without touching the backend.
    pub from_cache: bool,
}

impl FetchOutcome {
    fn from_snapshot(snapshot: &CacheSnapshot, from_cache: bool) -> Self {
        Self {
            stations: snapshot.stations.clone(),
            source: snapshot.source,
            error: snapshot.error.clone(),
            fetched_at: snapshot.fetched_at,
            stats: snapshot.stats,
            from_cache,
        }
    }
}

/// Snapshot of the store's state for consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    pub cache_valid: bool,
    pub last_fetch: Option<DateTime<Utc>>,
    pub source: Source,
    pub station_count: usize,
    pub last_error: Option<SyncError>,
    pub fetch_in_flight: bool,
}

/// What happened to a realtime update handed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    /// At least one field was written.
    Applied,
    /// Every field already held a newer value.
    Stale,
    /// No station with that id in the current snapshot.
    UnknownStation,
    /// Held until the in-flight fetch commits.
    Buffered,
    /// No fresh snapshot and no fetch running; the next fetch supersedes it.
    NoSnapshot,
    /// The store has been shut down.
    Inactive,
}

type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

struct InFlight {
    id: u64,
    generation: u64,
    future: SharedFetch,
}

/// Metadata of the last committed snapshot, kept after it expires.
#[derive(Debug, Clone)]
struct CommitMeta {
    fetched_at: DateTime<Utc>,
    source: Source,
    station_count: usize,
    error: Option<SyncError>,
}

struct Inner {
    fetcher: PaginationFetcher,
    normalizer: Normalizer,
    config: StoreConfig,
    cache: SnapshotCache,
    persist: Option<SnapshotFile>,
    /// Bumped by `invalidate` and `shutdown`; fetches from an older
    /// generation never commit.
    generation: AtomicU64,
    fetch_seq: AtomicU64,
    active: AtomicBool,
    inflight: Mutex<Option<InFlight>>,
    /// Serializes snapshot writes: fetch commits and realtime merges.
    write: tokio::sync::Mutex<PendingLedger>,
    last_commit: RwLock<Option<CommitMeta>>,
}

/// Owner of the authoritative station snapshot.
///
/// Cheap to clone; clones share one cache. Construct one per application
/// (or per test) and tear it down with [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct StationDataStore {
    inner: Arc<Inner>,
}

impl StationDataStore {
    pub fn new(fetcher: PaginationFetcher, normalizer: Normalizer, config: StoreConfig) -> Self {
        let persist = config.persist_path.as_ref().map(SnapshotFile::new);
        let ledger = PendingLedger::new(config.ledger_capacity);

        Self {
            inner: Arc::new(Inner {
                fetcher,
                normalizer,
                cache: SnapshotCache::new(),
                persist,
                generation: AtomicU64::new(0),
                fetch_seq: AtomicU64::new(0),
                active: AtomicBool::new(true),
                inflight: Mutex::new(None),
                write: tokio::sync::Mutex::new(ledger),
                last_commit: RwLock::new(None),
                config,
            }),
        }
    }

    /// Load a persisted live snapshot that is still inside its TTL.
    ///
    /// Returns `true` if a snapshot was loaded. Expiry counts from the
    /// original fetch time.
    pub async fn warm_start(&self) -> bool {
        let Some(file) = &self.inner.persist else {
            return false;
        };
        let Some(persisted) = file.load(self.inner.config.ttl) else {
            debug!(path = %file.path().display(), "no usable persisted snapshot");
            return false;
        };

        let count = persisted.stations.len();
        let snapshot = CacheSnapshot {
            stations: StationSet::new(persisted.stations),
            fetched_at: persisted.fetched_at,
            source: Source::Live,
            ttl: self.inner.config.ttl,
            error: None,
            stats: FetchStats::default(),
        };
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let committed = self.inner.commit(snapshot, generation, None).await;
        if committed.is_some() {
            info!(stations = count, "warm start from persisted snapshot");
        }
        committed.is_some()
    }

    /// Return the current stations, fetching from the backend when the
    /// snapshot is missing or stale.
    ///
    /// Never fails: on backend failure the fallback dataset is returned
    /// with the error attached. Concurrent callers share one fetch.
    pub async fn fetch_stations(&self) -> FetchOutcome {
        if !self.inner.active.load(Ordering::SeqCst) {
            return shutdown_outcome();
        }

        if let Some(snapshot) = self.inner.cache.get().await {
            return FetchOutcome::from_snapshot(&snapshot, true);
        }

        self.join_or_start_fetch().await
    }

    fn join_or_start_fetch(&self) -> SharedFetch {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let mut guard = self
            .inner
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(inflight) = guard.as_ref()
            && inflight.generation == generation
        {
            debug!(fetch = inflight.id, "joining in-flight fetch");
            return inflight.future.clone();
        }

        let id = self.inner.fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        let future = async move { inner.run_fetch(id, generation).await }
            .boxed()
            .shared();

        *guard = Some(InFlight {
            id,
            generation,
            future: future.clone(),
        });
        future
    }

    /// `live` or `fallback`, from the last committed snapshot.
    pub fn active_source(&self) -> Source {
        self.inner
            .last_commit()
            .map(|meta| meta.source)
            .unwrap_or(Source::Fallback)
    }

    pub async fn status(&self) -> StoreStatus {
        let cache_valid = self.inner.cache.get().await.is_some();
        let meta = self.inner.last_commit();

        StoreStatus {
            cache_valid,
            last_fetch: meta.as_ref().map(|m| m.fetched_at),
            source: meta.as_ref().map(|m| m.source).unwrap_or(Source::Fallback),
            station_count: meta.as_ref().map(|m| m.station_count).unwrap_or(0),
            last_error: meta.and_then(|m| m.error),
            fetch_in_flight: self.inner.fetch_in_flight(),
        }
    }

    /// Force the next [`fetch_stations`](Self::fetch_stations) to go to the
    /// backend. A fetch already running is ignored when it resolves.
    pub async fn invalidate(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.cache.invalidate().await;
        info!("station cache invalidated");
    }

    /// Merge a realtime update into the current snapshot.
    ///
    /// Last-write-wins per field by the update's timestamp. While a fetch is
    /// in flight the update is also held so it can be re-applied on top of
    /// the fetch result.
    pub async fn apply_update(&self, update: RealtimeUpdate) -> MergeOutcome {
        if !self.inner.active.load(Ordering::SeqCst) {
            return MergeOutcome::Inactive;
        }

        let mut ledger = self.inner.write.lock().await;
        let in_flight = self.inner.fetch_in_flight();

        let Some(snapshot) = self
            .inner
            .cache
            .get()
            .await
            .filter(|s| s.source == Source::Live)
        else {
            if in_flight {
                ledger.push(update);
                return MergeOutcome::Buffered;
            }
            return MergeOutcome::NoSnapshot;
        };

        let Some(current) = snapshot.stations.get(&update.station_id) else {
            if in_flight {
                ledger.push(update);
                return MergeOutcome::Buffered;
            }
            debug!(station = %update.station_id, "realtime update for unknown station");
            return MergeOutcome::UnknownStation;
        };

        let mut station = current.clone();
        let merge = station.apply_update(&update);

        if in_flight {
            ledger.push(update);
        }

        if !merge.any_applied() {
            return MergeOutcome::Stale;
        }

        let stations = snapshot.stations.with_replaced([station]);
        let count = stations.len();
        self.inner
            .cache
            .insert(Arc::new(snapshot.with_stations(stations)))
            .await;
        self.inner.update_commit_count(count);

        MergeOutcome::Applied
    }

    /// Tear the store down: pending fetches are ignored when they resolve,
    /// the cache is cleared, and later calls serve fallback data offline.
    pub async fn shutdown(&self) {
        self.inner.active.store(false, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.inner.cache.invalidate().await;
        info!("station store shut down");
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }
}

impl Inner {
    async fn run_fetch(&self, id: u64, generation: u64) -> FetchOutcome {
        // A fetch may have committed between the caller's cache check and now.
        if let Some(snapshot) = self.cache.get().await {
            self.clear_inflight(id);
            return FetchOutcome::from_snapshot(&snapshot, true);
        }

        let started_at = Utc::now();
        info!(fetch = id, "fetching stations from backend");

        let pages = self.fetcher.fetch_all().await;
        let snapshot = self.build_snapshot(pages, started_at);

        let outcome = match self.commit(snapshot.clone(), generation, Some(started_at)).await {
            Some(committed) => FetchOutcome::from_snapshot(&committed, false),
            None => {
                info!(fetch = id, "discarding result of superseded fetch");
                FetchOutcome::from_snapshot(&snapshot, false)
            }
        };

        self.clear_inflight(id);
        outcome
    }

    fn build_snapshot(&self, pages: PageFetch, started_at: DateTime<Utc>) -> CacheSnapshot {
        let normalized = self.normalizer.normalize_rows(&pages.rows, started_at);
        for skipped in &normalized.skipped {
            debug!(row = skipped.index, reason = %skipped.reason, "skipped backend row");
        }

        let stats = FetchStats {
            pages: pages.pages,
            rows_skipped: normalized.skipped.len(),
            truncated: pages.truncated,
        };

        if !normalized.stations.is_empty() {
            let error = pages.error.as_ref().map(|e| SyncError::Partial {
                pages: pages.pages,
                cause: e.to_string(),
            });
            let ttl = if error.is_some() {
                self.config.fallback_ttl
            } else {
                self.config.ttl
            };
            info!(
                stations = normalized.stations.len(),
                pages = pages.pages,
                skipped = stats.rows_skipped,
                partial = error.is_some(),
                "fetched live stations"
            );
            return CacheSnapshot {
                stations: StationSet::new(normalized.stations),
                fetched_at: started_at,
                source: Source::Live,
                ttl,
                error,
                stats,
            };
        }

        let error = match &pages.error {
            Some(e) => SyncError::from_backend(e),
            None if !pages.rows.is_empty() => SyncError::Parse {
                message: format!("none of {} rows could be normalized", pages.rows.len()),
            },
            None => SyncError::EmptyDataset,
        };
        warn!(error = %error, "serving fallback stations");

        CacheSnapshot {
            stations: StationSet::new(fallback_stations()),
            fetched_at: started_at,
            source: Source::Fallback,
            ttl: self.config.fallback_ttl,
            error: Some(error),
            stats,
        }
    }

    /// Make `snapshot` authoritative unless its generation is stale.
    ///
    /// With `started_at` set, pending realtime updates not older than it are
    /// re-applied on top of live data.
    async fn commit(
        &self,
        snapshot: CacheSnapshot,
        generation: u64,
        started_at: Option<DateTime<Utc>>,
    ) -> Option<Arc<CacheSnapshot>> {
        let mut ledger = self.write.lock().await;

        if !self.is_current(generation) {
            return None;
        }

        let pending = match started_at {
            Some(started_at) => ledger.drain_since(started_at),
            None => Vec::new(),
        };

        let snapshot = if snapshot.source == Source::Live && !pending.is_empty() {
            let mut changed: HashMap<_, Station> = HashMap::new();
            let mut reapplied = 0;
            for update in &pending {
                let station = match changed.entry(update.station_id.clone()) {
                    Entry::Occupied(entry) => entry.into_mut(),
                    Entry::Vacant(entry) => match snapshot.stations.get(&update.station_id) {
                        Some(station) => entry.insert(station.clone()),
                        None => continue,
                    },
                };
                if station.apply_update(update).any_applied() {
                    reapplied += 1;
                }
            }
            debug!(pending = pending.len(), reapplied, "re-applied realtime updates after fetch");
            let stations = snapshot.stations.with_replaced(changed.into_values());
            snapshot.with_stations(stations)
        } else {
            snapshot
        };

        let snapshot = Arc::new(snapshot);
        self.cache.insert(Arc::clone(&snapshot)).await;
        self.record_commit(&snapshot);
        drop(ledger);

        if snapshot.source == Source::Live
            && snapshot.error.is_none()
            && started_at.is_some()
            && let Some(file) = &self.persist
            && let Err(e) = file.save(&snapshot.stations, snapshot.fetched_at)
        {
            warn!(path = %file.path().display(), error = %e, "failed to persist snapshot");
        }

        Some(snapshot)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.active.load(Ordering::SeqCst) && self.generation.load(Ordering::SeqCst) == generation
    }

    fn fetch_in_flight(&self) -> bool {
        let generation = self.generation.load(Ordering::SeqCst);
        self.inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|f| f.generation == generation)
    }

    fn clear_inflight(&self, id: u64) {
        let mut guard = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.as_ref().is_some_and(|f| f.id == id) {
            *guard = None;
        }
    }

    fn record_commit(&self, snapshot: &CacheSnapshot) {
        let meta = CommitMeta {
            fetched_at: snapshot.fetched_at,
            source: snapshot.source,
            station_count: snapshot.stations.len(),
            error: snapshot.error.clone(),
        };
        *self.last_commit.write().unwrap_or_else(PoisonError::into_inner) = Some(meta);
    }

    fn update_commit_count(&self, count: usize) {
        if let Some(meta) = self
            .last_commit
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            meta.station_count = count;
        }
    }

    fn last_commit(&self) -> Option<CommitMeta> {
        self.last_commit
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn shutdown_outcome() -> FetchOutcome {
    FetchOutcome {
        stations: StationSet::new(fallback_stations()),
        source: Source::Fallback,
        error: Some(SyncError::ShutDown),
        fetched_at: Utc::now(),
        stats: FetchStats::default(),
        from_cache: false,
    }
}
