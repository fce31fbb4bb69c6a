//! Domain types for station data synchronization.
//!
//! All types enforce their invariants at construction time, so code that
//! receives these types can trust their validity.

mod coordinates;
mod station;
mod update;

pub use coordinates::{Coordinates, InvalidCoordinates};
pub use station::{FieldMerge, FuelPrices, PricePoint, Station, StationId, fuel_key, sanitize_price};
pub use update::RealtimeUpdate;

#[cfg(test)]
pub(crate) use station::test_support;
