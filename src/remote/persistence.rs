//! Placement persistence.
//!
//! Instances are ephemeral; what survives restarts is the placement record:
//! which peripheral widget sits where, plus any per-placement customization.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::warn;

/// Two placements within this distance on both axes are the same placement.
pub const POSITION_TOLERANCE: f64 = 0.1;

/// Durable record of one placed remote widget, keyed by
/// (peripheral, widget, floor, position).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRecord {
    #[serde(rename = "peripheralId")]
    pub peripheral_id: String,
    #[serde(rename = "widgetId")]
    pub widget_id: String,
    pub floor: String,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(rename = "customLabel", default, skip_serializing_if = "Option::is_none")]
    pub custom_label: Option<String>,
    #[serde(rename = "customIconSet", default, skip_serializing_if = "Option::is_none")]
    pub custom_icon_set: Option<String>,
    #[serde(
        rename = "customIconPackage",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_icon_package: Option<String>,
}

impl PlacementRecord {
    /// Stable-key equality with position tolerance.
    pub fn same_placement(&self, other: &PlacementRecord) -> bool {
        self.matches(&other.peripheral_id, &other.widget_id, &other.floor, other.x, other.y)
    }

    pub fn matches(&self, peripheral_id: &str, widget_id: &str, floor: &str, x: f64, y: f64) -> bool {
        self.peripheral_id == peripheral_id
            && self.widget_id == widget_id
            && self.floor == floor
            && (self.x - x).abs() <= POSITION_TOLERANCE
            && (self.y - y).abs() <= POSITION_TOLERANCE
    }
}

pub trait PlacementStore: Send + Sync {
    fn load(&self) -> Result<Vec<PlacementRecord>>;
    fn save(&self, records: &[PlacementRecord]) -> Result<()>;
}

/// JSON-file store under the app data directory.
pub struct JsonPlacementStore {
    path: PathBuf,
}

impl JsonPlacementStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PlacementStore for JsonPlacementStore {
    fn load(&self) -> Result<Vec<PlacementRecord>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        match serde_json::from_str(&contents) {
            Ok(records) => Ok(records),
            Err(e) => {
                // A corrupt file loses its placements but never takes the
                // engine down
                warn!(path = %self.path.display(), error = %e, "Unreadable placement file, starting empty");
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, records: &[PlacementRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(records)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

/// In-memory store for tests and embedding.
#[derive(Default)]
pub struct MemoryPlacementStore {
    records: Mutex<Vec<PlacementRecord>>,
}

impl MemoryPlacementStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlacementStore for MemoryPlacementStore {
    fn load(&self) -> Result<Vec<PlacementRecord>> {
        Ok(self.records.lock().map(|r| r.clone()).unwrap_or_default())
    }

    fn save(&self, records: &[PlacementRecord]) -> Result<()> {
        if let Ok(mut guard) = self.records.lock() {
            *guard = records.to_vec();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(x: f64, y: f64) -> PlacementRecord {
        PlacementRecord {
            peripheral_id: "tablet".to_string(),
            widget_id: "lamp".to_string(),
            floor: "ground".to_string(),
            x,
            y,
            parameters: None,
            custom_label: None,
            custom_icon_set: None,
            custom_icon_package: None,
        }
    }

    #[test]
    fn placement_identity_uses_tolerance() {
        assert!(record(40.0, 60.0).same_placement(&record(40.05, 59.95)));
        assert!(!record(40.0, 60.0).same_placement(&record(40.5, 60.0)));
        let mut other_floor = record(40.0, 60.0);
        other_floor.floor = "attic".to_string();
        assert!(!record(40.0, 60.0).same_placement(&other_floor));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonPlacementStore::new(dir.path().join("remote-widgets.json"));
        assert!(store.load().unwrap().is_empty());

        let mut rec = record(40.0, 60.0);
        rec.custom_label = Some("Hall".to_string());
        rec.parameters = Some(json!({"scene": 3}));
        store.save(&[rec.clone()]).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, vec![rec]);
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remote-widgets.json");
        std::fs::write(&path, "{broken").unwrap();
        let store = JsonPlacementStore::new(path);
        assert!(store.load().unwrap().is_empty());
    }
}
