//! Station data store: cache, fallback data and fetch orchestration.
//!
//! The store is the single mutation point for station records. Fetch results
//! and realtime merges both go through it; projections and classifiers only
//! read what it returns.

mod config;
mod error;
mod fallback;
mod ledger;
mod persist;
mod snapshot;
#[allow(clippy::module_inception)]
mod store;

pub use config::StoreConfig;
pub use error::{PersistError, SyncError};
pub use fallback::{FALLBACK_ID_PREFIX, fallback_stations, is_fallback_id};
pub use snapshot::{CacheSnapshot, FetchStats, Source, StationSet};
pub use store::{FetchOutcome, MergeOutcome, StationDataStore, StoreStatus};

#[cfg(test)]
mod store_tests;
