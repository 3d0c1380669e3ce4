//! Event dispatch table.
//!
//! Built wholesale from the current device map and their resolved widgets;
//! never mutated in place. Rebuild after any device or widget change.

use crate::device::{Device, DeviceKey};
use crate::path;
use crate::widget::WidgetDefinition;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const DEFAULT_ID_PATH: &str = "id";

/// One device's stake in an event type.
#[derive(Clone)]
pub struct Target {
    pub device: DeviceKey,
    pub widget: Arc<WidgetDefinition>,
    /// Dotted path into the event payload holding the target id
    pub id_path: String,
    /// State key -> update path spec (possibly property-gated)
    pub updates: BTreeMap<String, String>,
}

/// All targets for one event type, keyed by device so per-event routing is a
/// map lookup, not a scan.
#[derive(Default)]
pub struct Route {
    /// Distinct id paths the targets declare, in registration order
    id_paths: Vec<String>,
    targets: HashMap<DeviceKey, Target>,
}

impl Route {
    /// Extract the target device key from an event payload, trying each
    /// declared id path.
    pub fn extract_key(&self, data: &Value) -> Option<DeviceKey> {
        self.id_paths.iter().find_map(|p| target_key(data, p))
    }

    pub fn target_for(&self, key: &DeviceKey) -> Option<&Target> {
        self.targets.get(key)
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }
}

/// Event type -> per-device target index.
#[derive(Default)]
pub struct DispatchTable {
    routes: HashMap<String, Route>,
}

impl DispatchTable {
    pub fn route(&self, event_type: &str) -> Option<&Route> {
        self.routes.get(event_type)
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

/// Build the dispatch table for the given devices. Pure: reads its inputs,
/// owns its output.
pub fn build_dispatch(
    devices: &HashMap<DeviceKey, Device>,
    widgets: &HashMap<DeviceKey, Arc<WidgetDefinition>>,
) -> DispatchTable {
    let mut routes: HashMap<String, Route> = HashMap::new();
    for (key, _device) in devices {
        let Some(widget) = widgets.get(key) else {
            continue;
        };
        for (event_type, rule) in &widget.events {
            let id_path = rule
                .id
                .clone()
                .unwrap_or_else(|| DEFAULT_ID_PATH.to_string());
            let route = routes.entry(event_type.clone()).or_default();
            if !route.id_paths.contains(&id_path) {
                route.id_paths.push(id_path.clone());
            }
            route.targets.insert(
                key.clone(),
                Target {
                    device: key.clone(),
                    widget: Arc::clone(widget),
                    id_path,
                    updates: rule.updates.clone(),
                },
            );
        }
    }
    DispatchTable { routes }
}

/// A parsed update path spec.
///
/// `gates` lists the property names a `prop == event.property` condition (or
/// an `||` chain of them) accepts; empty means unconditional.
pub struct UpdatePath {
    pub gates: Vec<String>,
    pub path: String,
}

/// Parse `"path"`, `"prop == event.property ? path"` and
/// `"(a == event.property || b == event.property) ? path"` forms.
pub fn parse_update_path(spec: &str) -> UpdatePath {
    let Some((condition, path)) = spec.split_once('?') else {
        return UpdatePath {
            gates: Vec::new(),
            path: spec.trim().to_string(),
        };
    };

    let condition = condition.trim();
    let condition = condition
        .strip_prefix('(')
        .and_then(|c| c.strip_suffix(')'))
        .unwrap_or(condition);

    let mut gates = Vec::new();
    for clause in condition.split("||") {
        if let Some((prop, right)) = clause.split_once("==") {
            if right.trim() == "event.property" {
                gates.push(prop.trim().to_string());
            }
        }
    }

    UpdatePath {
        gates,
        path: path.trim().to_string(),
    }
}

/// Extract the target device key from an event payload.
pub fn target_key(data: &Value, id_path: &str) -> Option<DeviceKey> {
    path::resolve(data, id_path).and_then(DeviceKey::from_value)
}
