//! Geographic region classification.
//!
//! Regions and the city fallback table come from a JSON table, embedded
//! by default and replaceable at startup.

mod classify;
mod error;
mod table;

pub use classify::{RegionClassifier, RegionCounts};
pub use error::RegionTableError;
pub use table::{Region, RegionId, RegionTable, UNCLASSIFIED, fold_city};
