//! Data transfer objects for web requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Station;
use crate::realtime::{ConnectionState, RealtimeStats};
use crate::regions::RegionId;
use crate::spatial::{MapBounds, MapPoint};
use crate::store::{FetchStats, Source, StoreStatus, SyncError};

/// Query for the station listing.
#[derive(Debug, Default, Deserialize)]
pub struct StationsQuery {
    /// Only stations in this region (or `unclassified`)
    pub region: Option<String>,
}

/// Full station listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationsResponse<'a> {
    pub stations: Vec<&'a Station>,
    pub source: Source,
    /// Why the list is partial or fallback data
    pub error: Option<&'a SyncError>,
    pub fetched_at: DateTime<Utc>,
    pub stats: FetchStats,
}

/// Coordinate-only view for the map widget.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapResponse {
    pub points: Vec<MapPoint>,
    pub bounds: Option<MapBounds>,
    /// Stations left out for lack of valid coordinates
    pub excluded: usize,
    pub source: Source,
}

/// One region's station count.
#[derive(Debug, Serialize)]
pub struct RegionCount {
    pub id: RegionId,
    pub name: String,
    pub count: usize,
}

/// Per-region counts, in region priority order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionsResponse {
    pub regions: Vec<RegionCount>,
    pub unclassified: usize,
    pub total: usize,
    pub source: Source,
}

/// A single station with its derived region.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StationDetailResponse<'a> {
    pub station: &'a Station,
    pub region: RegionId,
    pub source: Source,
}

/// Realtime subscription health.
#[derive(Debug, Serialize)]
pub struct RealtimeStatus {
    pub enabled: bool,
    pub state: ConnectionState,
    pub stats: Option<RealtimeStats>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub store: StoreStatus,
    pub realtime: RealtimeStatus,
}

/// Result of a manual refresh.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub source: Source,
    pub station_count: usize,
    pub error: Option<SyncError>,
    pub fetched_at: DateTime<Utc>,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
