//! Minimal coordinate-only view of stations for map rendering.
//!
//! The map widget only needs where a station is and what to call it; prices,
//! addresses and brands stay in the full listing.

use serde::Serialize;

use crate::domain::{Station, StationId};

/// A station reduced to what a map marker needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub id: StationId,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

/// Bounding box of a set of map points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapBounds {
    pub min_lat: f64,
    pub min_lng: f64,
    pub max_lat: f64,
    pub max_lng: f64,
}

impl MapBounds {
    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lng..=self.max_lng).contains(&lng)
    }
}

/// Project stations onto map points.
///
/// Stations without valid coordinates are skipped; order is preserved.
pub fn project<'a>(stations: impl IntoIterator<Item = &'a Station>) -> Vec<MapPoint> {
    stations
        .into_iter()
        .filter_map(|station| {
            let coordinates = station.coordinates?;
            Some(MapPoint {
                id: station.id.clone(),
                name: station.name.clone(),
                lat: coordinates.lat(),
                lng: coordinates.lng(),
            })
        })
        .collect()
}

/// Smallest box containing every point, or `None` for an empty projection.
pub fn bounds(points: &[MapPoint]) -> Option<MapBounds> {
    let (first, rest) = points.split_first()?;
    let init = MapBounds {
        min_lat: first.lat,
        min_lng: first.lng,
        max_lat: first.lat,
        max_lng: first.lng,
    };

    Some(rest.iter().fold(init, |b, p| MapBounds {
        min_lat: b.min_lat.min(p.lat),
        min_lng: b.min_lng.min(p.lng),
        max_lat: b.max_lat.max(p.lat),
        max_lng: b.max_lng.max(p.lng),
    }))
}
