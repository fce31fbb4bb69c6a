//! The authoritative station snapshot and its TTL cache.
//!
//! The snapshot lives in a single-slot moka cache. Expiry is computed from
//! the snapshot's own `fetched_at` and `ttl`, so rewriting the slot with
//! merged realtime data keeps the original deadline while a new fetch
//! result starts a fresh one.

use std::collections::HashMap;
use std::ops::Index;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use moka::Expiry;
use moka::future::Cache as MokaCache;
use serde::{Deserialize, Serialize};

use crate::domain::{Station, StationId};

use super::error::SyncError;

/// Where the current snapshot's stations came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Live,
    Fallback,
}

/// Statistics about the fetch that produced a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchStats {
    pub pages: u32,
    pub rows_skipped: usize,
    pub truncated: bool,
}

/// The stations of one snapshot, in backend order and indexed by id.
///
/// Cloning is cheap. Records are shared between sets, so deriving a set
/// with a few stations replaced copies pointers, not stations.
#[derive(Debug, Clone)]
pub struct StationSet {
    stations: Arc<[Arc<Station>]>,
    index: Arc<HashMap<StationId, usize>>,
}

fn as_station(station: &Arc<Station>) -> &Station {
    station
}

impl StationSet {
    /// Index `stations`; on duplicate ids lookups find the first one.
    pub fn new(stations: Vec<Station>) -> Self {
        let mut index = HashMap::with_capacity(stations.len());
        for (i, station) in stations.iter().enumerate() {
            index.entry(station.id.clone()).or_insert(i);
        }
        Self {
            stations: stations.into_iter().map(Arc::new).collect(),
            index: Arc::new(index),
        }
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> + '_ {
        self.stations.iter().map(as_station)
    }

    pub fn get(&self, id: &StationId) -> Option<&Station> {
        self.index.get(id).map(|&i| &*self.stations[i])
    }

    /// A set with each of `replacements` swapped in for the station with
    /// the same id. Stations with unknown ids are ignored.
    pub fn with_replaced(&self, replacements: impl IntoIterator<Item = Station>) -> Self {
        let mut stations = self.stations.to_vec();
        for station in replacements {
            if let Some(&i) = self.index.get(&station.id) {
                stations[i] = Arc::new(station);
            }
        }
        Self {
            stations: stations.into(),
            index: Arc::clone(&self.index),
        }
    }
}

impl Index<usize> for StationSet {
    type Output = Station;

    fn index(&self, i: usize) -> &Station {
        &self.stations[i]
    }
}

impl<'a> IntoIterator for &'a StationSet {
    type Item = &'a Station;
    type IntoIter =
        std::iter::Map<std::slice::Iter<'a, Arc<Station>>, fn(&'a Arc<Station>) -> &'a Station>;

    fn into_iter(self) -> Self::IntoIter {
        self.stations.iter().map(as_station as fn(&'a Arc<Station>) -> &'a Station)
    }
}

impl Default for StationSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl From<Vec<Station>> for StationSet {
    fn from(stations: Vec<Station>) -> Self {
        Self::new(stations)
    }
}

/// One authoritative view of all stations.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    pub stations: StationSet,
    pub fetched_at: DateTime<Utc>,
    pub source: Source,
    pub ttl: Duration,
    pub error: Option<SyncError>,
    pub stats: FetchStats,
}

impl CacheSnapshot {
    /// Time left before this snapshot goes stale, measured at `now`.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> Duration {
        let age = (now - self.fetched_at).to_std().unwrap_or(Duration::ZERO);
        self.ttl.saturating_sub(age)
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        !self.remaining_ttl(now).is_zero()
    }

    /// A copy of this snapshot holding different stations.
    pub fn with_stations(&self, stations: StationSet) -> Self {
        Self {
            stations,
            ..self.clone()
        }
    }
}

/// Cache key for the single snapshot slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SnapshotSlot;

struct SnapshotExpiry;

impl Expiry<SnapshotSlot, Arc<CacheSnapshot>> for SnapshotExpiry {
    fn expire_after_create(
        &self,
        _key: &SnapshotSlot,
        value: &Arc<CacheSnapshot>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.remaining_ttl(Utc::now()))
    }

    fn expire_after_update(
        &self,
        _key: &SnapshotSlot,
        value: &Arc<CacheSnapshot>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.remaining_ttl(Utc::now()))
    }
}

/// TTL-bounded holder of the current snapshot.
#[derive(Clone)]
pub(crate) struct SnapshotCache {
    slot: MokaCache<SnapshotSlot, Arc<CacheSnapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        let slot = MokaCache::builder()
            .max_capacity(1)
            .expire_after(SnapshotExpiry)
            .build();
        Self { slot }
    }

    /// The current snapshot, if one exists and has not expired.
    pub async fn get(&self) -> Option<Arc<CacheSnapshot>> {
        let snapshot = self.slot.get(&SnapshotSlot).await?;
        // moka's clock granularity can let an entry outlive its deadline briefly.
        snapshot.is_fresh(Utc::now()).then_some(snapshot)
    }

    pub async fn insert(&self, snapshot: Arc<CacheSnapshot>) {
        self.slot.insert(SnapshotSlot, snapshot).await;
    }

    pub async fn invalidate(&self) {
        self.slot.invalidate(&SnapshotSlot).await;
    }
}
