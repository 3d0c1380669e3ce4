use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Stable device identity. Controllers hand out numeric ids; imported and
/// virtual devices may use strings. The two identity spaces never collide
/// with peripheral-issued widget instance ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceKey {
    Num(i64),
    Str(String),
}

impl DeviceKey {
    /// Extract a device key from an event payload field.
    pub fn from_value(value: &Value) -> Option<DeviceKey> {
        match value {
            Value::Number(n) => n.as_i64().map(DeviceKey::Num),
            Value::String(s) => Some(DeviceKey::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKey::Num(n) => write!(f, "{}", n),
            DeviceKey::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for DeviceKey {
    fn from(n: i64) -> Self {
        DeviceKey::Num(n)
    }
}

impl From<&str> for DeviceKey {
    fn from(s: &str) -> Self {
        DeviceKey::Str(s.to_string())
    }
}

/// Position on a floor image, in the floor's native coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Placement of a device on one floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloorPlacement {
    pub floor_id: String,
    pub position: Position,
}

/// A placed device backed by the controller.
///
/// `state` holds the cached state record; its key set stays a subset of the
/// resolved widget's declared defaults (event application enforces this).
/// Both the legacy single-floor shape (`floor_id` + `position`) and the
/// multi-floor shape (`floors`) are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceKey,
    pub name: String,
    /// Widget-type key, e.g. "binarySwitch"
    #[serde(rename = "type")]
    pub device_type: String,
    /// Explicit widget reference of shape "package/widget", overriding
    /// type-based resolution
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub widget: Option<String>,
    /// Per-device render parameter overrides (e.g. "iconSet")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub floors: Vec<FloorPlacement>,
}

impl Device {
    pub fn is_on_floor(&self, floor_id: &str) -> bool {
        if !self.floors.is_empty() {
            self.floors.iter().any(|f| f.floor_id == floor_id)
        } else {
            self.floor_id.as_deref() == Some(floor_id)
        }
    }

    pub fn position_on(&self, floor_id: &str) -> Option<Position> {
        if !self.floors.is_empty() {
            self.floors
                .iter()
                .find(|f| f.floor_id == floor_id)
                .map(|f| f.position)
        } else if self.floor_id.as_deref() == Some(floor_id) {
            self.position
        } else {
            None
        }
    }

    /// All floors this device is placed on.
    pub fn floor_ids(&self) -> Vec<&str> {
        if !self.floors.is_empty() {
            self.floors.iter().map(|f| f.floor_id.as_str()).collect()
        } else {
            self.floor_id.iter().map(|s| s.as_str()).collect()
        }
    }
}
