//! Region geometry and city lookup, loaded from a JSON table.
//!
//! Polygon vertices are `[lng, lat]` pairs (GeoJSON order). Regions keep the
//! order they have in the file, which is the order they are tested in.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use geo::{LineString, MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};

use crate::domain::Coordinates;

use super::error::RegionTableError;

/// Bucket for stations that match no region.
pub const UNCLASSIFIED: &str = "unclassified";

const EMBEDDED_TABLE: &str = include_str!("../../data/regions.json");

/// Identifier of a region, or of the `unclassified` bucket.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn unclassified() -> Self {
        Self(UNCLASSIFIED.to_string())
    }

    pub fn is_unclassified(&self) -> bool {
        self.0 == UNCLASSIFIED
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegionId({})", self.0)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named region and its area.
#[derive(Debug, Clone)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    pub area: MultiPolygon<f64>,
}

#[derive(Deserialize)]
struct RawTable {
    regions: Vec<RawRegion>,
    #[serde(default)]
    cities: HashMap<String, String>,
}

#[derive(Deserialize)]
struct RawRegion {
    id: String,
    name: String,
    polygons: Vec<Vec<[f64; 2]>>,
}

/// Validated region table.
#[derive(Debug, Clone)]
pub struct RegionTable {
    regions: Vec<Region>,
    /// Folded city name to index into `regions`.
    cities: HashMap<String, usize>,
}

impl RegionTable {
    /// The table compiled into the binary.
    pub fn embedded() -> Result<Self, RegionTableError> {
        Self::from_json(EMBEDDED_TABLE)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RegionTableError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| RegionTableError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, RegionTableError> {
        let raw: RawTable = serde_json::from_str(json)?;
        Self::validate(raw)
    }

    fn validate(raw: RawTable) -> Result<Self, RegionTableError> {
        if raw.regions.is_empty() {
            return Err(RegionTableError::Empty);
        }

        let mut seen = HashSet::new();
        let mut regions = Vec::with_capacity(raw.regions.len());
        for region in raw.regions {
            if region.id == UNCLASSIFIED {
                return Err(RegionTableError::ReservedId(region.id));
            }
            if !seen.insert(region.id.clone()) {
                return Err(RegionTableError::DuplicateRegion(region.id));
            }
            if region.polygons.is_empty() {
                return Err(RegionTableError::InvalidRing {
                    region: region.id,
                    ring: 0,
                    reason: "region has no polygons".to_string(),
                });
            }

            let mut polygons = Vec::with_capacity(region.polygons.len());
            for (ring, points) in region.polygons.iter().enumerate() {
                check_ring(points).map_err(|reason| RegionTableError::InvalidRing {
                    region: region.id.clone(),
                    ring,
                    reason,
                })?;
                let exterior: LineString<f64> =
                    points.iter().map(|[lng, lat]| (*lng, *lat)).collect::<Vec<_>>().into();
                polygons.push(Polygon::new(exterior, vec![]));
            }

            regions.push(Region {
                id: RegionId::new(region.id),
                name: region.name,
                area: MultiPolygon::new(polygons),
            });
        }

        let mut cities: HashMap<String, usize> = HashMap::new();
        for (city, region_id) in raw.cities {
            let index = regions
                .iter()
                .position(|r| r.id.as_str() == region_id)
                .ok_or_else(|| RegionTableError::UnknownRegion {
                    city: city.clone(),
                    region: region_id.clone(),
                })?;
            let key = fold_city(&city);
            if let Some(&existing) = cities.get(&key)
                && existing != index
            {
                return Err(RegionTableError::ConflictingCity {
                    city,
                    first: regions[existing].id.to_string(),
                    second: region_id,
                });
            }
            cities.insert(key, index);
        }

        Ok(Self { regions, cities })
    }

    /// Regions in priority order.
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, id: &RegionId) -> Option<&Region> {
        self.regions.iter().find(|r| &r.id == id)
    }

    /// Look up a city name, ignoring case, accents and spacing.
    pub fn region_for_city(&self, city: &str) -> Option<&Region> {
        let key = fold_city(city);
        if key.is_empty() {
            return None;
        }
        self.cities.get(&key).map(|&i| &self.regions[i])
    }

    pub fn city_count(&self) -> usize {
        self.cities.len()
    }
}

/// A ring must be closed, have at least three distinct vertices and only
/// valid coordinates.
fn check_ring(points: &[[f64; 2]]) -> Result<(), String> {
    for [lng, lat] in points {
        Coordinates::new(*lat, *lng).map_err(|e| e.to_string())?;
    }

    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return Err("ring is empty".to_string());
    };
    if first != last {
        return Err("ring is not closed".to_string());
    }

    let distinct: HashSet<(u64, u64)> = points[..points.len() - 1]
        .iter()
        .map(|[lng, lat]| (lng.to_bits(), lat.to_bits()))
        .collect();
    if distinct.len() < 3 {
        return Err(format!("ring has {} distinct points, need 3", distinct.len()));
    }

    Ok(())
}

/// Fold a city name for lookup: lowercase, strip common Latin accents, and
/// treat hyphens, apostrophes and runs of whitespace as a single space.
///
/// ```
/// use fuel_server::regions::fold_city;
///
/// assert_eq!(fold_city("  Liège "), "liege");
/// assert_eq!(fold_city("Molenbeek-Saint-Jean"), "molenbeek saint jean");
/// ```
pub fn fold_city(name: &str) -> String {
    let folded: String = name
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
            'ç' => 'c',
            'è' | 'é' | 'ê' | 'ë' => 'e',
            'ì' | 'í' | 'î' | 'ï' => 'i',
            'ñ' => 'n',
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
            'ù' | 'ú' | 'û' | 'ü' => 'u',
            'ý' | 'ÿ' => 'y',
            '-' | '\'' | '’' => ' ',
            c => c,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = "[[0.5, 0.5], [1.5, 0.5], [1.5, 1.5], [0.5, 1.5], [0.5, 0.5]]";

    fn table(regions: &str, cities: &str) -> Result<RegionTable, RegionTableError> {
        RegionTable::from_json(&format!(r#"{{ "regions": {regions}, "cities": {cities} }}"#))
    }

    #[test]
    fn embedded_table_loads_in_priority_order() {
        let table = RegionTable::embedded().unwrap();
        let ids: Vec<_> = table.regions().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["brussels", "flanders", "wallonia"]);
        assert!(table.city_count() > 0);
    }

    #[test]
    fn city_lookup_folds_case_accents_and_spacing() {
        let table = RegionTable::embedded().unwrap();
        let region = |name| table.region_for_city(name).map(|r| r.id.as_str());

        assert_eq!(region("Liège"), Some("wallonia"));
        assert_eq!(region("  LIEGE "), Some("wallonia"));
        assert_eq!(region("la   louviere"), Some("wallonia"));
        assert_eq!(region("sint niklaas"), Some("flanders"));
        assert_eq!(region("Bruxelles"), Some("brussels"));
        assert_eq!(region("Paris"), None);
        assert_eq!(region(""), None);
    }

    #[test]
    fn fold_city_examples() {
        assert_eq!(fold_city("Molenbeek-Saint-Jean"), "molenbeek saint jean");
        assert_eq!(fold_city("ÉCAUSSINNES"), "ecaussinnes");
        assert_eq!(fold_city("\tGent\n"), "gent");
    }

    #[test]
    fn duplicate_region_ids_rejected() {
        let regions = format!(
            r#"[{{"id": "a", "name": "A", "polygons": [{SQUARE}]}},
                {{"id": "a", "name": "A again", "polygons": [{SQUARE}]}}]"#
        );
        assert!(matches!(
            table(&regions, "{}"),
            Err(RegionTableError::DuplicateRegion(id)) if id == "a"
        ));
    }

    #[test]
    fn unclassified_is_reserved() {
        let regions = format!(r#"[{{"id": "unclassified", "name": "X", "polygons": [{SQUARE}]}}]"#);
        assert!(matches!(table(&regions, "{}"), Err(RegionTableError::ReservedId(_))));
    }

    #[test]
    fn open_ring_rejected() {
        let regions = r#"[{"id": "a", "name": "A", "polygons": [[[0.5, 0.5], [1.5, 0.5], [1.5, 1.5]]]}]"#;
        assert!(matches!(
            table(regions, "{}"),
            Err(RegionTableError::InvalidRing { reason, .. }) if reason.contains("not closed")
        ));
    }

    #[test]
    fn degenerate_ring_rejected() {
        let regions = r#"[{"id": "a", "name": "A", "polygons": [[[0.5, 0.5], [1.5, 0.5], [0.5, 0.5]]]}]"#;
        assert!(matches!(
            table(regions, "{}"),
            Err(RegionTableError::InvalidRing { reason, .. }) if reason.contains("distinct")
        ));
    }

    #[test]
    fn out_of_range_vertex_rejected() {
        let regions = r#"[{"id": "a", "name": "A", "polygons": [[[0.5, 0.5], [200.0, 0.5], [1.5, 1.5], [0.5, 0.5]]]}]"#;
        assert!(matches!(table(regions, "{}"), Err(RegionTableError::InvalidRing { .. })));
    }

    #[test]
    fn city_pointing_at_unknown_region_rejected() {
        let regions = format!(r#"[{{"id": "a", "name": "A", "polygons": [{SQUARE}]}}]"#);
        assert!(matches!(
            table(&regions, r#"{"Somewhere": "b"}"#),
            Err(RegionTableError::UnknownRegion { region, .. }) if region == "b"
        ));
    }

    #[test]
    fn conflicting_city_spellings_rejected() {
        let regions = format!(
            r#"[{{"id": "a", "name": "A", "polygons": [{SQUARE}]}},
                {{"id": "b", "name": "B", "polygons": [{SQUARE}]}}]"#
        );
        assert!(matches!(
            table(&regions, r#"{"Liège": "a", "LIEGE": "b"}"#),
            Err(RegionTableError::ConflictingCity { .. })
        ));
    }

    #[test]
    fn empty_table_rejected() {
        assert!(matches!(table("[]", "{}"), Err(RegionTableError::Empty)));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            RegionTable::from_path("/nonexistent/regions.json"),
            Err(RegionTableError::Io { .. })
        ));
    }

    #[test]
    fn loads_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.json");
        std::fs::write(
            &path,
            format!(r#"{{"regions": [{{"id": "a", "name": "A", "polygons": [{SQUARE}]}}]}}"#),
        )
        .unwrap();

        let table = RegionTable::from_path(&path).unwrap();
        assert_eq!(table.regions().len(), 1);
        assert_eq!(table.city_count(), 0);
    }
}
