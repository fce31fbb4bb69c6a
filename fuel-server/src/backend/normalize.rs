//! Normalization of backend rows into canonical [`Station`] records.
//!
//! Backend versions disagree on field names (`lat` vs `Latitude` vs an
//! opaque `field_4821`). Every canonical field is resolved with one fixed
//! precedence order:
//!
//! 1. the canonical key,
//! 2. built-in aliases, in listed order,
//! 3. backend field identifiers registered with [`Normalizer::with_field_id`],
//! 4. the field default.
//!
//! A candidate whose value is null, empty or unparseable is skipped and the
//! search continues. Fuel prices from a nested map (`fuelPrices`) win over
//! flat per-fuel columns; flat columns only fill fuels the map left out.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::domain::{Coordinates, FuelPrices, Station, StationId, fuel_key};

use super::error::RowError;
use super::pagination::Row;

/// A canonical station field that backend columns can map onto.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Name,
    Address,
    City,
    PostalCode,
    Brand,
    Lat,
    Lng,
    FuelPrices,
    LastUpdated,
    /// A flat price column for one fuel type.
    Fuel(String),
}

impl Field {
    /// Canonical key first, then known aliases in precedence order.
    fn keys(&self) -> &'static [&'static str] {
        match self {
            Field::Id => &["id", "rowId", "row_id", "stationId", "station_id", "ID", "Id"],
            Field::Name => &["name", "Name", "stationName", "station_name", "title"],
            Field::Address => &["address", "Address", "street", "Street"],
            Field::City => &["city", "City", "town", "locality", "municipality"],
            Field::PostalCode => &["postalCode", "postal_code", "PostalCode", "postcode", "zip"],
            Field::Brand => &["brand", "Brand", "operator"],
            Field::Lat => &["lat", "latitude", "Latitude", "LAT"],
            Field::Lng => &["lng", "lon", "longitude", "Longitude", "LNG"],
            Field::FuelPrices => &["fuelPrices", "fuel_prices", "prices"],
            Field::LastUpdated => &["lastUpdated", "last_updated", "updatedAt", "updated_at"],
            Field::Fuel(fuel) => fuel_columns(fuel),
        }
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(fuel) = s.strip_prefix("fuel:") {
            let fuel = fuel_key(fuel);
            if fuel.is_empty() {
                return Err("empty fuel name".to_string());
            }
            return Ok(Field::Fuel(fuel));
        }
        match s {
            "id" => Ok(Field::Id),
            "name" => Ok(Field::Name),
            "address" => Ok(Field::Address),
            "city" => Ok(Field::City),
            "postalCode" => Ok(Field::PostalCode),
            "brand" => Ok(Field::Brand),
            "lat" => Ok(Field::Lat),
            "lng" => Ok(Field::Lng),
            "fuelPrices" => Ok(Field::FuelPrices),
            "lastUpdated" => Ok(Field::LastUpdated),
            other => Err(format!("unknown field: {other}")),
        }
    }
}

/// Known fuel types with their flat-column aliases.
const FUEL_COLUMNS: &[(&str, &[&str])] = &[
    ("diesel", &["diesel", "Diesel", "price_diesel", "gasoil"]),
    ("e10", &["e10", "E10", "price_e10", "super_e10"]),
    ("e5", &["e5", "E5", "price_e5", "super95", "euro95"]),
    ("super98", &["super98", "Super98", "price_super98", "e98"]),
    ("lpg", &["lpg", "LPG", "price_lpg"]),
];

fn fuel_columns(fuel: &str) -> &'static [&'static str] {
    FUEL_COLUMNS
        .iter()
        .find(|(name, _)| *name == fuel)
        .map(|(_, cols)| *cols)
        .unwrap_or(&[])
}

/// Result of normalizing a batch of rows.
#[derive(Debug, Default)]
pub struct Normalized {
    pub stations: Vec<Station>,
    pub skipped: Vec<RowError>,
}

/// Turns raw rows into canonical stations.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    field_ids: HashMap<Field, Vec<String>>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend-specific column identifier for a field.
    ///
    /// Identifiers are consulted after the canonical key and built-in aliases.
    pub fn with_field_id(mut self, field: Field, key: impl Into<String>) -> Self {
        self.field_ids.entry(field).or_default().push(key.into());
        self
    }

    /// Normalize every row, skipping (and recording) rows that cannot be used.
    ///
    /// Duplicate ids keep the first row.
    pub fn normalize_rows(&self, rows: &[Row], fetched_at: DateTime<Utc>) -> Normalized {
        let mut out = Normalized::default();
        let mut seen = HashSet::new();

        for (index, row) in rows.iter().enumerate() {
            match self.normalize_row(index, row, fetched_at) {
                Ok(station) => {
                    if seen.insert(station.id.clone()) {
                        out.stations.push(station);
                    } else {
                        out.skipped.push(RowError {
                            index,
                            reason: format!("duplicate id {}", station.id),
                        });
                    }
                }
                Err(e) => out.skipped.push(e),
            }
        }

        out
    }

    /// Normalize one row.
    ///
    /// `fetched_at` is the default `last_updated` for rows that carry none.
    pub fn normalize_row(
        &self,
        index: usize,
        row: &Row,
        fetched_at: DateTime<Utc>,
    ) -> Result<Station, RowError> {
        let obj = row.as_object().ok_or_else(|| RowError {
            index,
            reason: "row is not a JSON object".to_string(),
        })?;

        let id = self
            .resolve(obj, &Field::Id, value_as_string)
            .ok_or_else(|| RowError {
                index,
                reason: "missing id".to_string(),
            })?;

        let text = |field: Field| self.resolve(obj, &field, value_as_string).unwrap_or_default();

        let lat = self.resolve(obj, &Field::Lat, value_as_f64);
        let lng = self.resolve(obj, &Field::Lng, value_as_f64);
        let coordinates = match (lat, lng) {
            (Some(lat), Some(lng)) => Coordinates::from_backend(lat, lng).ok(),
            _ => None,
        };

        let last_updated = self
            .resolve(obj, &Field::LastUpdated, value_as_timestamp)
            .unwrap_or(fetched_at);

        Ok(Station {
            id: StationId::new(id),
            name: text(Field::Name),
            address: text(Field::Address),
            city: text(Field::City),
            postal_code: text(Field::PostalCode),
            brand: text(Field::Brand),
            coordinates,
            fuel_prices: self.fuel_prices(obj, last_updated),
            last_updated,
        })
    }

    /// Candidate keys for a field, in precedence order.
    fn candidates<'a>(&'a self, field: &'a Field) -> impl Iterator<Item = &'a str> {
        field.keys().iter().copied().chain(
            self.field_ids
                .get(field)
                .into_iter()
                .flatten()
                .map(String::as_str),
        )
    }

    /// First candidate whose value parses.
    fn resolve<T>(
        &self,
        obj: &Map<String, Value>,
        field: &Field,
        parse: impl Fn(&Value) -> Option<T>,
    ) -> Option<T> {
        self.candidates(field)
            .filter_map(|key| obj.get(key))
            .find_map(parse)
    }

    fn fuel_prices(&self, obj: &Map<String, Value>, at: DateTime<Utc>) -> FuelPrices {
        let mut prices = FuelPrices::new();

        let nested = self
            .candidates(&Field::FuelPrices)
            .filter_map(|key| obj.get(key))
            .find_map(Value::as_object);
        if let Some(map) = nested {
            for (fuel, value) in map {
                let price = value
                    .get("price")
                    .and_then(value_as_f64)
                    .or_else(|| value_as_f64(value));
                if let Some(price) = price {
                    prices.insert(fuel, price, at);
                }
            }
        }

        let mut flat: Vec<Field> = FUEL_COLUMNS
            .iter()
            .map(|(fuel, _)| Field::Fuel((*fuel).to_string()))
            .collect();
        for field in self.field_ids.keys() {
            if matches!(field, Field::Fuel(_)) && !flat.contains(field) {
                flat.push(field.clone());
            }
        }

        for field in &flat {
            let Field::Fuel(fuel) = field else { continue };
            if prices.contains(fuel) {
                continue;
            }
            if let Some(price) = self.resolve(obj, field, value_as_f64) {
                prices.insert(fuel, price, at);
            }
        }

        prices
    }
}

/// Single-select cells arrive as `{ "value": ... }`.
fn unwrap_select(value: &Value) -> &Value {
    match value {
        Value::Object(map) => map.get("value").unwrap_or(value),
        _ => value,
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match unwrap_select(value) {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match unwrap_select(value) {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    }
}

/// Epoch numbers above this are milliseconds rather than seconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

pub(crate) fn value_as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match unwrap_select(value) {
        Value::Number(n) => epoch_to_datetime(n.as_f64()?),
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn epoch_to_datetime(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let millis = if n >= EPOCH_MILLIS_THRESHOLD { n as i64 } else { (n * 1000.0) as i64 };
    DateTime::from_timestamp_millis(millis)
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    s.parse::<f64>().ok().and_then(epoch_to_datetime)
}
