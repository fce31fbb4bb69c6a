//! Geographic coordinate type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error returned when constructing coordinates from invalid values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid coordinates ({lat}, {lng}): {reason}")]
pub struct InvalidCoordinates {
    lat: f64,
    lng: f64,
    reason: &'static str,
}

/// A valid WGS84 latitude/longitude pair.
///
/// Latitude is always finite and within [-90, 90], longitude finite and
/// within [-180, 180]. Any `Coordinates` value is valid by construction,
/// including values deserialized from JSON.
///
/// # Examples
///
/// ```
/// use fuel_server::domain::Coordinates;
///
/// let brussels = Coordinates::new(50.8466, 4.3528).unwrap();
/// assert_eq!(brussels.lat(), 50.8466);
///
/// assert!(Coordinates::new(91.0, 0.0).is_err());
/// assert!(Coordinates::new(f64::NAN, 4.0).is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinates")]
pub struct Coordinates {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct RawCoordinates {
    lat: f64,
    lng: f64,
}

impl TryFrom<RawCoordinates> for Coordinates {
    type Error = InvalidCoordinates;

    fn try_from(raw: RawCoordinates) -> Result<Self, Self::Error> {
        Coordinates::new(raw.lat, raw.lng)
    }
}

impl Coordinates {
    /// Validate and construct a coordinate pair.
    pub fn new(lat: f64, lng: f64) -> Result<Self, InvalidCoordinates> {
        let invalid = |reason| InvalidCoordinates { lat, lng, reason };

        if !lat.is_finite() || !lng.is_finite() {
            return Err(invalid("must be finite numbers"));
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(invalid("latitude must be within [-90, 90]"));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(invalid("longitude must be within [-180, 180]"));
        }

        Ok(Self { lat, lng })
    }

    /// Like [`Coordinates::new`], but also rejects the `(0, 0)` placeholder
    /// that tabular backends commonly store for "unknown location".
    pub fn from_backend(lat: f64, lng: f64) -> Result<Self, InvalidCoordinates> {
        if lat == 0.0 && lng == 0.0 {
            return Err(InvalidCoordinates {
                lat,
                lng,
                reason: "(0, 0) is a missing-location placeholder",
            });
        }
        Self::new(lat, lng)
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }
}

impl fmt::Debug for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Coordinates({}, {})", self.lat, self.lng)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.lat, self.lng)
    }
}
