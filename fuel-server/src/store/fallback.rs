//! Built-in sample stations served when live data is unavailable.

use chrono::{DateTime, TimeDelta, Utc};

use crate::domain::{Coordinates, FuelPrices, Station, StationId};

/// Every fallback station id starts with this prefix.
pub const FALLBACK_ID_PREFIX: &str = "fallback-";

/// Timestamp of the sample prices: 2024-01-01T00:00:00Z.
fn sample_time() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH + TimeDelta::seconds(1_704_067_200)
}

struct Sample {
    id: &'static str,
    name: &'static str,
    address: &'static str,
    city: &'static str,
    postal_code: &'static str,
    brand: &'static str,
    coords: Option<(f64, f64)>,
    prices: &'static [(&'static str, f64)],
}

const SAMPLES: &[Sample] = &[
    Sample {
        id: "brussels-1",
        name: "TotalEnergies Bruxelles Midi",
        address: "Boulevard du Midi 110",
        city: "Bruxelles",
        postal_code: "1000",
        brand: "TotalEnergies",
        coords: Some((50.8354, 4.3341)),
        prices: &[("diesel", 1.859), ("e10", 1.749), ("e5", 1.829)],
    },
    Sample {
        id: "antwerpen-1",
        name: "Q8 Antwerpen Noorderlaan",
        address: "Noorderlaan 50",
        city: "Antwerpen",
        postal_code: "2030",
        brand: "Q8",
        coords: Some((51.2420, 4.4146)),
        prices: &[("diesel", 1.839), ("e10", 1.729), ("lpg", 0.749)],
    },
    Sample {
        id: "gent-1",
        name: "Shell Gent Dampoort",
        address: "Dendermondsesteenweg 12",
        city: "Gent",
        postal_code: "9040",
        brand: "Shell",
        coords: Some((51.0560, 3.7410)),
        prices: &[("diesel", 1.869), ("e10", 1.759), ("super98", 1.939)],
    },
    Sample {
        id: "liege-1",
        name: "Lukoil Liège Guillemins",
        address: "Rue des Guillemins 40",
        city: "Liège",
        postal_code: "4000",
        brand: "Lukoil",
        coords: Some((50.6245, 5.5660)),
        prices: &[("diesel", 1.819), ("e10", 1.719)],
    },
    Sample {
        id: "namur-1",
        name: "Esso Namur Centre",
        address: "Chaussée de Louvain 8",
        city: "Namur",
        postal_code: "5000",
        brand: "Esso",
        coords: None,
        prices: &[("diesel", 1.849), ("e5", 1.809)],
    },
];

/// The fixed fallback dataset.
///
/// Deterministic and non-empty; every call returns the same stations.
pub fn fallback_stations() -> Vec<Station> {
    let at = sample_time();
    SAMPLES
        .iter()
        .map(|sample| {
            let mut fuel_prices = FuelPrices::new();
            for (fuel, price) in sample.prices {
                fuel_prices.insert(fuel, *price, at);
            }
            Station {
                id: StationId::new(format!("{FALLBACK_ID_PREFIX}{}", sample.id)),
                name: sample.name.to_string(),
                address: sample.address.to_string(),
                city: sample.city.to_string(),
                postal_code: sample.postal_code.to_string(),
                brand: sample.brand.to_string(),
                coordinates: sample
                    .coords
                    .and_then(|(lat, lng)| Coordinates::new(lat, lng).ok()),
                fuel_prices,
                last_updated: at,
            }
        })
        .collect()
}

pub fn is_fallback_id(id: &StationId) -> bool {
    id.as_str().starts_with(FALLBACK_ID_PREFIX)
}
