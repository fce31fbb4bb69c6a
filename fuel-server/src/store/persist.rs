//! Disk persistence for the last complete live snapshot.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Station;

use super::error::PersistError;

/// Persisted snapshot with metadata.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PersistedSnapshot {
    /// When the stations were fetched from the backend.
    pub fetched_at: DateTime<Utc>,
    /// The persisted station data.
    pub stations: Vec<Station>,
}

/// Snapshot file on disk.
#[derive(Debug, Clone)]
pub(crate) struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Try to load a snapshot that is still younger than `ttl`.
    ///
    /// Returns `None` if the file doesn't exist, is invalid, or has expired.
    pub fn load(&self, ttl: Duration) -> Option<PersistedSnapshot> {
        let contents = std::fs::read_to_string(&self.path).ok()?;
        let persisted: PersistedSnapshot = serde_json::from_str(&contents).ok()?;

        let age = (Utc::now() - persisted.fetched_at).to_std().unwrap_or(Duration::ZERO);
        if age >= ttl || persisted.stations.is_empty() {
            return None;
        }

        Some(persisted)
    }

    /// Save stations to disk.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<'a>(
        &self,
        stations: impl IntoIterator<Item = &'a Station>,
        fetched_at: DateTime<Utc>,
    ) -> Result<(), PersistError> {
        let persisted = PersistedSnapshot {
            fetched_at,
            stations: stations.into_iter().cloned().collect(),
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| PersistError::Cache {
                message: format!("failed to create cache directory: {}", e),
            })?;
        }

        let json = serde_json::to_string(&persisted).map_err(|e| PersistError::Cache {
            message: format!("failed to serialize snapshot: {}", e),
        })?;

        std::fs::write(&self.path, json).map_err(|e| PersistError::Cache {
            message: format!("failed to write snapshot file: {}", e),
        })?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
