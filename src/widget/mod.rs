pub mod resolver;
pub mod store;

pub use resolver::{IconSet, WidgetResolver};
pub use store::{FsWidgetStore, PackageInfo, PackageManifest, WidgetMapping, WidgetStore};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Package id widget and icon sets shipped with the app resolve under.
pub const BUILTIN_PACKAGE: &str = "com.fibaro.built-in";

/// Minimum widget definition version this engine accepts.
pub const MIN_WIDGET_VERSION: &str = "0.1.5";

/// How a widget type is rendered and acted upon. Shared by every device of
/// the type; immutable once loaded (a type change triggers a reload, never a
/// mutation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetDefinition {
    #[serde(rename = "widgetVersion", default)]
    pub widget_version: Option<String>,
    /// Device type this widget serves (package widgets declare it)
    #[serde(rename = "type", default)]
    pub device_type: Option<String>,
    #[serde(rename = "iconSet", default)]
    pub icon_set: Option<String>,
    /// Default state template; a device's state keys stay a subset of these
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub render: Option<RenderDef>,
    /// Remote-read rules: target state key -> api + payload path
    #[serde(default)]
    pub getters: BTreeMap<String, GetterDef>,
    /// Remote-write rules
    #[serde(default)]
    pub actions: BTreeMap<String, ActionDef>,
    /// External event wiring: event type -> routing + state updates
    #[serde(default)]
    pub events: BTreeMap<String, EventRule>,
    /// Owning package, set by the store on load
    #[serde(skip)]
    pub package: Option<String>,
}

impl WidgetDefinition {
    /// Minimal stand-in for device types nothing resolves for: a static
    /// fallback icon, empty state, no getters, actions or events.
    pub fn generic() -> Self {
        WidgetDefinition {
            widget_version: Some(MIN_WIDGET_VERSION.to_string()),
            device_type: None,
            icon_set: Some("generic".to_string()),
            state: Map::new(),
            render: Some(RenderDef {
                icon: Some(IconRule::Static {
                    icon: "device".to_string(),
                }),
                subtext: None,
                style: BTreeMap::new(),
            }),
            getters: BTreeMap::new(),
            actions: BTreeMap::new(),
            events: BTreeMap::new(),
            package: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderDef {
    #[serde(default)]
    pub icon: Option<IconRule>,
    #[serde(default)]
    pub subtext: Option<SubtextRule>,
    /// Style key -> template, values interpolated against state
    #[serde(default)]
    pub style: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IconRule {
    #[serde(rename = "static")]
    Static { icon: String },
    #[serde(rename = "conditional")]
    Conditional {
        property: String,
        conditions: Vec<IconCondition>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IconCondition {
    pub when: String,
    pub icon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtextRule {
    pub template: String,
    #[serde(default)]
    pub visible: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetterDef {
    /// API path template; `${id}` substitutes the device identity
    pub api: String,
    /// Dotted path into the response payload
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDef {
    pub api: String,
    #[serde(default)]
    pub method: Option<String>,
    /// Body template; `${value}` / `${propertyName}` spans substitute the
    /// action value
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRule {
    /// Dotted path into the event payload holding the target device id;
    /// defaults to "id"
    #[serde(default)]
    pub id: Option<String>,
    /// State key -> event payload path (optionally gated on event.property)
    #[serde(default)]
    pub updates: BTreeMap<String, String>,
}

/// Semantic version compatibility: major must match exactly, minor/patch must
/// be at least the minimum. Missing components parse as 0.
pub fn is_version_compatible(widget_version: &str, min_version: &str) -> bool {
    let parse = |v: &str| -> (u32, u32, u32) {
        let mut parts = v.split('.').map(|p| p.parse::<u32>().unwrap_or(0));
        (
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
            parts.next().unwrap_or(0),
        )
    };
    let (w_major, w_minor, w_patch) = parse(widget_version);
    let (m_major, m_minor, m_patch) = parse(min_version);

    if w_major != m_major {
        return false;
    }
    if w_minor < m_minor {
        return false;
    }
    if w_minor > m_minor {
        return true;
    }
    w_patch >= m_patch
}
