use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::geo::LatLng;

// A single recorded visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelLogEntry {
    #[serde(alias = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub image: String,
    pub visit_date: DateTime<Utc>,
}

impl TravelLogEntry {
    pub fn position(&self) -> LatLng {
        LatLng::new(self.latitude, self.longitude)
    }
}

// Read-only store of log entries, shared between the view and the HTTP layer
#[derive(Clone, Default)]
pub struct LogStore {
    entries: Arc<RwLock<Arc<Vec<TravelLogEntry>>>>,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn from_entries(entries: Vec<TravelLogEntry>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(Arc::new(entries))),
        }
    }

    /// Loads a JSON array of entries, replacing whatever was held before.
    pub fn load_from_file(&self, path: &Path) -> Result<usize> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read log file {}", path.display()))?;
        let entries: Vec<TravelLogEntry> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse log file {}", path.display()))?;
        let count = entries.len();
        self.replace_all(entries);
        Ok(count)
    }

    pub fn replace_all(&self, entries: Vec<TravelLogEntry>) {
        let mut guard = self.entries.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(entries);
    }

    /// Snapshot of the current list. The `Arc` changes only when the list is replaced.
    pub fn all(&self) -> Arc<Vec<TravelLogEntry>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
