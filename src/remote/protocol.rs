//! Wire protocol between peripherals and the engine.
//!
//! JSON messages tagged by a `type` field. Unknown types fail to parse and
//! are dropped by the connection task; the connection itself survives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Peripheral → Engine message types
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum PeripheralMessage {
    #[serde(rename = "register-widgets")]
    RegisterWidgets {
        #[serde(rename = "peripheralId")]
        peripheral_id: String,
        #[serde(rename = "peripheralName", default)]
        peripheral_name: Option<String>,
        widgets: Vec<RemoteWidgetSpec>,
    },
    #[serde(rename = "widget-update")]
    WidgetUpdate {
        #[serde(rename = "widgetId")]
        widget_id: String,
        changes: WidgetChanges,
    },
    #[serde(rename = "unregister-widgets")]
    UnregisterWidgets {
        #[serde(rename = "peripheralId")]
        peripheral_id: String,
    },
    #[serde(rename = "heartbeat")]
    Heartbeat,
}

/// One widget a peripheral offers for placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteWidgetSpec {
    pub id: String,
    pub name: String,
    #[serde(rename = "iconSet", default)]
    pub icon_set: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Free-form UI hints, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui: Option<Value>,
}

/// Partial appearance update; absent fields stay as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WidgetChanges {
    #[serde(rename = "iconSet", default)]
    pub icon_set: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(rename = "backgroundColor", default)]
    pub background_color: Option<String>,
    #[serde(default)]
    pub style: BTreeMap<String, String>,
}

/// Engine → Peripheral message types
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum EngineMessage {
    #[serde(rename = "request-widgets")]
    RequestWidgets,
    #[serde(rename = "widget-event")]
    WidgetEvent {
        #[serde(rename = "widgetId")]
        widget_id: String,
        event: String,
        data: WidgetEventData,
    },
}

/// Context delivered with an interaction event.
#[derive(Debug, Clone, Serialize)]
pub struct WidgetEventData {
    pub floor: String,
    pub x: f64,
    pub y: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}
