//! Store configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Default TTL for live snapshots: 5 minutes.
const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default TTL for fallback and partial snapshots.
const DEFAULT_FALLBACK_TTL: Duration = Duration::from_secs(30);

/// Configuration for the station data store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// How long a complete live snapshot stays fresh.
    pub ttl: Duration,

    /// How long a fallback or partial snapshot stays fresh before the
    /// backend is tried again.
    pub fallback_ttl: Duration,

    /// Maximum realtime updates held while a fetch is in flight.
    pub ledger_capacity: usize,

    /// Where to persist the last complete live snapshot, if anywhere.
    pub persist_path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            ..Self::default()
        }
    }

    pub fn with_fallback_ttl(mut self, ttl: Duration) -> Self {
        self.fallback_ttl = ttl;
        self
    }

    pub fn with_ledger_capacity(mut self, capacity: usize) -> Self {
        self.ledger_capacity = capacity.max(1);
        self
    }

    pub fn with_persist_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.persist_path = Some(path.into());
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            fallback_ttl: DEFAULT_FALLBACK_TTL,
            ledger_capacity: 10_000,
            persist_path: None,
        }
    }
}
