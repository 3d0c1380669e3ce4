//! Device render pipeline.
//!
//! Turns a device's cached state and its resolved widget definition into calls
//! on a [`DeviceVisual`] sink. The sink is the UI's side of the seam; this
//! module never draws anything itself.

use crate::controller::ControllerClient;
use crate::device::Device;
use crate::expr::{evaluate_condition, interpolate};
use crate::path;
use crate::widget::{IconRule, WidgetDefinition, WidgetResolver};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Sink for one device's on-screen representation.
pub trait DeviceVisual: Send {
    fn set_icon(&mut self, path: &str);
    fn set_text(&mut self, text: &str);
    fn hide_text(&mut self);
    fn set_style(&mut self, key: &str, value: &str);
}

/// Apply a device's current state to its visual.
///
/// Missing icons, unresolved templates and absent rules degrade softly; the
/// visual is simply left as it was for that facet.
pub fn render_device(
    device: &Device,
    widget: &WidgetDefinition,
    visual: &mut dyn DeviceVisual,
    resolver: &WidgetResolver,
) {
    let empty = Map::new();
    let state = device.state.as_ref().unwrap_or(&empty);
    let Some(render) = widget.render.as_ref() else {
        return;
    };

    if let Some(rule) = render.icon.as_ref() {
        apply_icon(device, widget, rule, state, visual, resolver);
    }

    if let Some(subtext) = render.subtext.as_ref() {
        let visible = match subtext.visible.as_deref() {
            Some(predicate) => evaluate_condition(state, predicate),
            None => true,
        };
        if visible {
            visual.set_text(&interpolate(&subtext.template, state));
        } else {
            visual.hide_text();
        }
    }

    for (key, template) in &render.style {
        visual.set_style(key, &interpolate(template, state));
    }
}

fn apply_icon(
    device: &Device,
    widget: &WidgetDefinition,
    rule: &IconRule,
    state: &Map<String, Value>,
    visual: &mut dyn DeviceVisual,
    resolver: &WidgetResolver,
) {
    // A per-device iconSet parameter overrides the widget's set for icon
    // loading only; everything else still follows the widget definition.
    let set_name = device
        .params
        .as_ref()
        .and_then(|p| p.get("iconSet"))
        .and_then(|v| v.as_str())
        .or(widget.icon_set.as_deref());
    let Some(set_name) = set_name else {
        return;
    };
    let icons = resolver.load_icon_set(set_name, widget.package.as_deref());

    let icon_name = match rule {
        IconRule::Static { icon } => Some(icon.as_str()),
        IconRule::Conditional {
            property,
            conditions,
        } => {
            // Conditions see only the property they switch on
            let mut context = Map::new();
            if let Some(value) = state.get(property) {
                context.insert(property.clone(), value.clone());
            }
            conditions
                .iter()
                .find(|c| evaluate_condition(&context, &c.when))
                .map(|c| c.icon.as_str())
        }
    };

    match icon_name.and_then(|name| icons.get(name)) {
        Some(icon_path) => visual.set_icon(icon_path),
        None => debug!(
            device = %device.id,
            set = %set_name,
            "No icon matched current state"
        ),
    }
}

/// Fetch a device's initial state through the widget's getters.
///
/// Starts from the widget's declared defaults; each getter overwrites its
/// target key. A failing getter is logged and skipped so one bad read never
/// blanks the device.
pub async fn seed_device_state(
    device: &mut Device,
    widget: &WidgetDefinition,
    client: &ControllerClient,
) {
    let mut state = widget.state.clone();

    for (key, getter) in &widget.getters {
        let payload = match client.get_value(&getter.api, &device.id).await {
            Ok(payload) => payload,
            Err(err) => {
                warn!(device = %device.id, key = %key, error = %err, "Getter read failed");
                continue;
            }
        };
        match path::resolve(&payload, &getter.path) {
            Some(value) => {
                state.insert(key.clone(), normalize_state_value(key, value.clone()));
            }
            None => {
                warn!(device = %device.id, key = %key, path = %getter.path, "Getter path missing in payload");
            }
        }
    }

    device.state = Some(state);
}

/// Normalize a raw payload value before it enters a state record.
pub fn normalize_state_value(key: &str, value: Value) -> Value {
    let value = unwrap_value(value);
    if key == "colorComponents" {
        if let Value::String(raw) = &value {
            return Value::Object(parse_color_components(raw));
        }
    }
    value
}

/// Unwrap the controller's `{"value": X}` envelope.
pub fn unwrap_value(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("value") => {
            map.remove("value").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Parse a `"R,G,B,WW,CW"` color string into its component record. Missing or
/// malformed components read as 0.
pub fn parse_color_components(raw: &str) -> Map<String, Value> {
    let mut parts = raw.split(',').map(|p| p.trim().parse::<i64>().unwrap_or(0));
    let mut components = Map::new();
    for name in ["red", "green", "blue", "warmWhite", "coldWhite"] {
        components.insert(name.to_string(), Value::from(parts.next().unwrap_or(0)));
    }
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::store::MemoryWidgetStore;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingVisual {
        icon: Option<String>,
        text: Option<String>,
        text_hidden: bool,
        styles: Vec<(String, String)>,
    }

    impl DeviceVisual for RecordingVisual {
        fn set_icon(&mut self, path: &str) {
            self.icon = Some(path.to_string());
        }
        fn set_text(&mut self, text: &str) {
            self.text = Some(text.to_string());
        }
        fn hide_text(&mut self) {
            self.text_hidden = true;
        }
        fn set_style(&mut self, key: &str, value: &str) {
            self.styles.push((key.to_string(), value.to_string()));
        }
    }

    fn dim_light_widget() -> WidgetDefinition {
        serde_json::from_value(json!({
            "widgetVersion": "0.1.5",
            "iconSet": "dimLight",
            "state": {"power": false, "value": 0},
            "render": {
                "icon": {
                    "type": "conditional",
                    "property": "power",
                    "conditions": [
                        {"when": "power == true", "icon": "on"},
                        {"when": "power == false", "icon": "off"}
                    ]
                },
                "subtext": {"template": "${value}%", "visible": "power == true"},
                "style": {"opacity": "${value}"}
            }
        }))
        .unwrap()
    }

    fn device(state: Value) -> Device {
        serde_json::from_value(json!({
            "id": 12,
            "name": "Hall lamp",
            "type": "dimmer",
            "state": state
        }))
        .unwrap()
    }

    fn resolver_with_dim_light() -> WidgetResolver {
        let store = Arc::new(MemoryWidgetStore::new());
        store.add_icon_dir(None, "dimLight", &["on.svg", "off.svg"]);
        store.add_icon_dir(None, "altSet", &["on.svg"]);
        WidgetResolver::new(store)
    }

    #[test]
    fn conditional_icon_and_visible_subtext() {
        let resolver = resolver_with_dim_light();
        let widget = dim_light_widget();
        let device = device(json!({"power": true, "value": 75}));
        let mut visual = RecordingVisual::default();

        render_device(&device, &widget, &mut visual, &resolver);

        assert_eq!(visual.icon.as_deref(), Some("icons/dimLight/on.svg"));
        assert_eq!(visual.text.as_deref(), Some("75%"));
        assert_eq!(visual.styles, vec![("opacity".to_string(), "75".to_string())]);
    }

    #[test]
    fn subtext_hidden_when_predicate_false() {
        let resolver = resolver_with_dim_light();
        let widget = dim_light_widget();
        let device = device(json!({"power": false, "value": 75}));
        let mut visual = RecordingVisual::default();

        render_device(&device, &widget, &mut visual, &resolver);

        assert_eq!(visual.icon.as_deref(), Some("icons/dimLight/off.svg"));
        assert!(visual.text.is_none());
        assert!(visual.text_hidden);
    }

    #[test]
    fn device_icon_set_override() {
        let resolver = resolver_with_dim_light();
        let widget = dim_light_widget();
        let mut device = device(json!({"power": true, "value": 10}));
        device.params = json!({"iconSet": "altSet"}).as_object().cloned();
        let mut visual = RecordingVisual::default();

        render_device(&device, &widget, &mut visual, &resolver);

        assert_eq!(visual.icon.as_deref(), Some("icons/altSet/on.svg"));
    }

    #[test]
    fn missing_icon_degrades_softly() {
        let resolver = resolver_with_dim_light();
        let widget = dim_light_widget();
        // No condition matches a null power value
        let device = device(json!({"power": null, "value": 0}));
        let mut visual = RecordingVisual::default();

        render_device(&device, &widget, &mut visual, &resolver);

        assert!(visual.icon.is_none());
    }

    #[test]
    fn value_envelope_unwrap() {
        assert_eq!(unwrap_value(json!({"value": 42})), json!(42));
        assert_eq!(unwrap_value(json!(42)), json!(42));
        assert_eq!(unwrap_value(json!({"other": 1})), json!({"other": 1}));
    }

    #[test]
    fn color_component_parsing() {
        assert_eq!(
            Value::Object(parse_color_components("255,128,0,10,20")),
            json!({"red": 255, "green": 128, "blue": 0, "warmWhite": 10, "coldWhite": 20})
        );
        // Malformed and missing components read as 0
        assert_eq!(
            Value::Object(parse_color_components("255,x")),
            json!({"red": 255, "green": 0, "blue": 0, "warmWhite": 0, "coldWhite": 0})
        );
    }

    #[test]
    fn color_string_normalizes_only_under_its_key() {
        assert_eq!(
            normalize_state_value("colorComponents", json!("1,2,3,4,5")),
            json!({"red": 1, "green": 2, "blue": 3, "warmWhite": 4, "coldWhite": 5})
        );
        assert_eq!(normalize_state_value("mode", json!("1,2,3")), json!("1,2,3"));
    }
}
