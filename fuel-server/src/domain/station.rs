//! Station records and their fuel prices.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Coordinates;
use super::update::RealtimeUpdate;

/// Opaque station identifier, unique within a session.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(String);

impl StationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StationId({})", self.0)
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Canonical fuel-type key: trimmed, lowercase ASCII.
pub fn fuel_key(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// A price is only meaningful when finite and strictly positive.
///
/// ```
/// use fuel_server::domain::sanitize_price;
///
/// assert_eq!(sanitize_price(1.759), Some(1.759));
/// assert_eq!(sanitize_price(0.0), None);
/// assert_eq!(sanitize_price(f64::INFINITY), None);
/// ```
pub fn sanitize_price(price: f64) -> Option<f64> {
    (price.is_finite() && price > 0.0).then_some(price)
}

/// One fuel price with the time it was last written.
///
/// `price: None` is a tombstone: the fuel is absent, but its timestamp still
/// takes part in last-write-wins ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    pub price: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// Fuel-type → price mapping with per-fuel timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FuelPrices(BTreeMap<String, PricePoint>);

impl FuelPrices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a price unconditionally. Non-positive prices are stored as absent.
    pub fn insert(&mut self, fuel: &str, price: f64, at: DateTime<Utc>) {
        self.0.insert(
            fuel_key(fuel),
            PricePoint {
                price: sanitize_price(price),
                updated_at: at,
            },
        );
    }

    /// Last-write-wins merge of one field.
    ///
    /// Returns `false` (and leaves the field untouched) when the stored value
    /// is newer than `at`. Equal timestamps apply.
    pub fn merge(&mut self, fuel: &str, price: f64, at: DateTime<Utc>) -> bool {
        let key = fuel_key(fuel);
        if let Some(existing) = self.0.get(&key)
            && existing.updated_at > at
        {
            return false;
        }
        self.0.insert(
            key,
            PricePoint {
                price: sanitize_price(price),
                updated_at: at,
            },
        );
        true
    }

    /// The available price for a fuel, if any.
    pub fn get(&self, fuel: &str) -> Option<f64> {
        self.0.get(&fuel_key(fuel)).and_then(|p| p.price)
    }

    pub fn contains(&self, fuel: &str) -> bool {
        self.0.contains_key(&fuel_key(fuel))
    }

    /// Iterate over fuels with an available price.
    pub fn available(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0
            .iter()
            .filter_map(|(fuel, point)| point.price.map(|p| (fuel.as_str(), p)))
    }

    /// Number of fuels with an available price.
    pub fn len(&self) -> usize {
        self.available().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One fuel retail location.
///
/// `coordinates` is `None` when the backend had no usable location; such a
/// station is still listed but is left out of spatial views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: StationId,
    pub name: String,
    pub address: String,
    pub city: String,
    pub postal_code: String,
    pub brand: String,
    pub coordinates: Option<Coordinates>,
    pub fuel_prices: FuelPrices,
    pub last_updated: DateTime<Utc>,
}

/// Per-field result of merging a realtime update into a station.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldMerge {
    pub applied: usize,
    pub stale: usize,
}

impl FieldMerge {
    pub fn any_applied(&self) -> bool {
        self.applied > 0
    }
}

impl Station {
    /// Merge a realtime update into this station, field by field.
    ///
    /// An update without a price delta only advances `last_updated`.
    pub fn apply_update(&mut self, update: &RealtimeUpdate) -> FieldMerge {
        let mut result = FieldMerge::default();

        if update.prices.is_empty() {
            if update.timestamp >= self.last_updated {
                self.last_updated = update.timestamp;
                result.applied = 1;
            } else {
                result.stale = 1;
            }
            return result;
        }

        for (fuel, price) in &update.prices {
            if self.fuel_prices.merge(fuel, *price, update.timestamp) {
                result.applied += 1;
            } else {
                result.stale += 1;
            }
        }

        if result.any_applied() && update.timestamp > self.last_updated {
            self.last_updated = update.timestamp;
        }

        result
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    pub fn station(id: &str, coords: Option<(f64, f64)>, city: &str) -> Station {
        Station {
            id: StationId::from(id),
            name: format!("Station {id}"),
            address: String::new(),
            city: city.to_string(),
            postal_code: String::new(),
            brand: "Test".to_string(),
            coordinates: coords.and_then(|(lat, lng)| Coordinates::new(lat, lng).ok()),
            fuel_prices: FuelPrices::new(),
            last_updated: ts(0),
        }
    }
}
