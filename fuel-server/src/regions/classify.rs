//! Station to region classification.

use std::collections::BTreeMap;
use std::sync::Arc;

use geo::{Intersects, Point};
use serde::Serialize;

use crate::domain::Station;

use super::table::{RegionId, RegionTable};

/// Per-region station counts.
///
/// Every configured region is present (zero if empty), plus `unclassified`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RegionCounts(BTreeMap<RegionId, usize>);

impl RegionCounts {
    pub fn get(&self, id: &str) -> usize {
        self.0.get(&RegionId::new(id)).copied().unwrap_or(0)
    }

    pub fn unclassified(&self) -> usize {
        self.get(super::table::UNCLASSIFIED)
    }

    /// Stations assigned to some region.
    pub fn classified(&self) -> usize {
        self.0
            .iter()
            .filter(|(id, _)| !id.is_unclassified())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RegionId, usize)> {
        self.0.iter().map(|(id, n)| (id, *n))
    }
}

/// Assigns stations to exactly one region each.
///
/// Located stations are tested against region polygons in table order and
/// the first hit wins; boundaries count as inside. Stations that match no
/// polygon, or have no valid coordinates, are matched by city name.
#[derive(Debug, Clone)]
pub struct RegionClassifier {
    table: Arc<RegionTable>,
}

impl RegionClassifier {
    pub fn new(table: RegionTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &RegionTable {
        &self.table
    }

    pub fn classify(&self, station: &Station) -> RegionId {
        let by_area = station.coordinates.and_then(|coordinates| {
            let point = Point::new(coordinates.lng(), coordinates.lat());
            self.table
                .regions()
                .iter()
                .find(|region| region.area.intersects(&point))
        });

        by_area
            .or_else(|| self.table.region_for_city(&station.city))
            .map(|r| r.id.clone())
            .unwrap_or_else(RegionId::unclassified)
    }

    pub fn counts<'a>(&self, stations: impl IntoIterator<Item = &'a Station>) -> RegionCounts {
        let mut counts = self.empty_buckets(|| 0usize);
        for station in stations {
            *counts.entry(self.classify(station)).or_default() += 1;
        }
        RegionCounts(counts)
    }

    /// Stations bucketed by region, in input order within each bucket.
    pub fn group<'a>(
        &self,
        stations: impl IntoIterator<Item = &'a Station>,
    ) -> BTreeMap<RegionId, Vec<&'a Station>> {
        let mut groups = self.empty_buckets(Vec::new);
        for station in stations {
            groups.entry(self.classify(station)).or_default().push(station);
        }
        groups
    }

    fn empty_buckets<T>(&self, empty: impl Fn() -> T) -> BTreeMap<RegionId, T> {
        self.table
            .regions()
            .iter()
            .map(|r| r.id.clone())
            .chain(std::iter::once(RegionId::unclassified()))
            .map(|id| (id, empty()))
            .collect()
    }
}
