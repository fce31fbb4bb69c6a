//! Realtime partial updates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::station::{StationId, fuel_key};

/// A partial price update pushed by the realtime endpoint.
///
/// An empty `prices` map is a station-level touch: it carries no price but
/// still advances the station's `last_updated`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeUpdate {
    pub station_id: StationId,
    pub prices: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
}

impl RealtimeUpdate {
    /// A single-fuel price delta.
    pub fn price(
        station_id: impl Into<StationId>,
        fuel: &str,
        price: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let mut prices = BTreeMap::new();
        prices.insert(fuel_key(fuel), price);
        Self {
            station_id: station_id.into(),
            prices,
            timestamp,
        }
    }

    /// A station-level touch with no price delta.
    pub fn touch(station_id: impl Into<StationId>, timestamp: DateTime<Utc>) -> Self {
        Self {
            station_id: station_id.into(),
            prices: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn is_touch(&self) -> bool {
        self.prices.is_empty()
    }
}
