//! Region table error types.

/// Errors raised while loading or validating a region table.
#[derive(Debug, thiserror::Error)]
pub enum RegionTableError {
    /// The table file could not be read
    #[error("failed to read region table {path}: {message}")]
    Io { path: String, message: String },

    /// The table is not valid JSON or has the wrong shape
    #[error("region table JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("region table defines no regions")]
    Empty,

    #[error("duplicate region id {0:?}")]
    DuplicateRegion(String),

    /// The id is reserved for stations matching no region
    #[error("region id {0:?} is reserved")]
    ReservedId(String),

    #[error("region {region:?} ring {ring}: {reason}")]
    InvalidRing {
        region: String,
        ring: usize,
        reason: String,
    },

    /// A city entry points at a region the table does not define
    #[error("city {city:?} maps to unknown region {region:?}")]
    UnknownRegion { city: String, region: String },

    /// Two spellings of a city fold to the same key but disagree
    #[error("city {city:?} maps to both {first:?} and {second:?}")]
    ConflictingCity {
        city: String,
        first: String,
        second: String,
    },
}
