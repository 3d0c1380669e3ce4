use super::store::{WidgetMapping, WidgetStore};
use super::{is_version_compatible, WidgetDefinition, BUILTIN_PACKAGE, MIN_WIDGET_VERSION};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Icon name -> relative path under the data directory
pub type IconSet = BTreeMap<String, String>;

const ICON_EXTENSIONS: [&str; 4] = ["svg", "png", "jpg", "jpeg"];

/// Resolves widget definitions for device types and loads icon sets, with
/// per-process caches. Definitions are immutable once cached; a widget-set
/// change means dropping the resolver and rebuilding, never mutating.
pub struct WidgetResolver {
    store: Arc<dyn WidgetStore>,
    widgets: DashMap<String, Arc<WidgetDefinition>>,
    icon_sets: DashMap<(String, String), Arc<IconSet>>,
}

impl WidgetResolver {
    pub fn new(store: Arc<dyn WidgetStore>) -> Self {
        Self {
            store,
            widgets: DashMap::new(),
            icon_sets: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn WidgetStore> {
        &self.store
    }

    /// Resolve the widget definition governing a device type.
    ///
    /// Priority order, first match wins:
    /// 1. explicit `package/widget` reference
    /// 2. persisted type mapping
    /// 3. built-in widget named after the type
    /// 4. installed package claiming the type (lexicographically smallest
    ///    package id wins)
    ///
    /// `None` means the caller falls back to a generic widget. Definitions
    /// failing the version gate are rejected entirely.
    pub fn resolve(
        &self,
        device_type: &str,
        explicit: Option<&str>,
    ) -> Option<Arc<WidgetDefinition>> {
        let cache_key = match explicit {
            Some(reference) => format!("{}@{}", device_type, reference),
            None => device_type.to_string(),
        };
        if let Some(cached) = self.widgets.get(&cache_key) {
            return Some(Arc::clone(&cached));
        }

        let widget = self.resolve_uncached(device_type, explicit)?;

        let version = widget.widget_version.as_deref().unwrap_or("");
        if !is_version_compatible(version, MIN_WIDGET_VERSION) {
            warn!(
                device_type = %device_type,
                widget_version = %version,
                min_version = %MIN_WIDGET_VERSION,
                "Widget version incompatible, rejecting"
            );
            return None;
        }

        let widget = Arc::new(widget);
        self.widgets.insert(cache_key, Arc::clone(&widget));
        info!(
            device_type = %device_type,
            package = widget.package.as_deref().unwrap_or("?"),
            "Resolved widget definition"
        );
        Some(widget)
    }

    fn resolve_uncached(
        &self,
        device_type: &str,
        explicit: Option<&str>,
    ) -> Option<WidgetDefinition> {
        // 1. Explicit package/widget reference
        if let Some(reference) = explicit {
            if let Some((package, widget)) = reference.split_once('/') {
                return self.store.load_packaged(package, widget);
            }
            warn!(reference = %reference, "Malformed explicit widget reference");
        }

        // 2. Persisted mapping
        if let Some(WidgetMapping { package, widget }) = self.store.mapping_for(device_type) {
            if let Some(def) = self.store.load_packaged(&package, &widget) {
                return Some(def);
            }
            warn!(
                device_type = %device_type,
                package = %package,
                "Mapped widget failed to load, continuing resolution"
            );
        }

        // 3. Built-in widget named after the type
        if let Some(def) = self.store.load_builtin(device_type) {
            return Some(def);
        }

        // 4. Installed packages claiming the type, smallest package id first
        let mut packages = self.store.packages();
        packages.sort_by(|a, b| a.id.cmp(&b.id));
        for package in packages {
            if !package
                .manifest
                .device_types
                .iter()
                .any(|t| t == device_type)
            {
                continue;
            }
            for widget_id in &package.manifest.provides.widgets {
                if let Some(def) = self.store.load_packaged(&package.id, widget_id) {
                    if def.device_type.as_deref() == Some(device_type) {
                        return Some(def);
                    }
                }
            }
        }

        None
    }

    /// Load an icon set, cached by `(package, name)`.
    ///
    /// Accepts legacy fully-qualified forms (`icons/built-in/X`,
    /// `icons/packages/P/X`, `icons/X`) and normalizes them before the cache
    /// lookup. Built-in and root locations fall back to each other. A missing
    /// set yields an empty map, not an error.
    pub fn load_icon_set(&self, name: &str, package: Option<&str>) -> Arc<IconSet> {
        let (set, package) = normalize_icon_ref(name, package);
        let cache_key = (package.clone().unwrap_or_default(), set.clone());
        if let Some(cached) = self.icon_sets.get(&cache_key) {
            return Arc::clone(&cached);
        }

        let candidates: Vec<Option<String>> = match package.as_deref() {
            Some(BUILTIN_PACKAGE) => vec![Some(BUILTIN_PACKAGE.to_string()), None],
            Some(other) => vec![Some(other.to_string())],
            None => vec![None, Some(BUILTIN_PACKAGE.to_string())],
        };

        let mut icons = IconSet::new();
        let mut found = false;
        for candidate in &candidates {
            if let Some(files) = self.store.list_icon_files(candidate.as_deref(), &set) {
                icons = build_icon_map(&set, candidate.as_deref(), &files);
                found = true;
                break;
            }
        }
        if !found {
            warn!(set = %set, package = package.as_deref().unwrap_or("-"), "Icon set not found");
        }

        let icons = Arc::new(icons);
        self.icon_sets.insert(cache_key, Arc::clone(&icons));
        icons
    }
}

/// Normalize legacy fully-qualified icon references into `(set, package)`.
fn normalize_icon_ref(name: &str, package: Option<&str>) -> (String, Option<String>) {
    if let Some(rest) = name.strip_prefix("icons/") {
        if let Some(set) = rest.strip_prefix("built-in/") {
            return (set.to_string(), Some(BUILTIN_PACKAGE.to_string()));
        }
        if let Some(packaged) = rest.strip_prefix("packages/") {
            if let Some((pkg, set)) = packaged.split_once('/') {
                return (set.to_string(), Some(pkg.to_string()));
            }
        }
        return (rest.to_string(), None);
    }
    (name.to_string(), package.map(|p| p.to_string()))
}

fn build_icon_map(set: &str, package: Option<&str>, files: &[String]) -> IconSet {
    let prefix = match package {
        Some(BUILTIN_PACKAGE) => format!("icons/built-in/{}", set),
        Some(pkg) => format!("icons/packages/{}/{}", pkg, set),
        None => format!("icons/{}", set),
    };

    let mut icons = IconSet::new();
    for file in files {
        let Some((stem, ext)) = file.rsplit_once('.') else {
            continue;
        };
        if !ICON_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            continue;
        }
        icons.insert(stem.to_string(), format!("{}/{}", prefix, file));
    }
    icons
}

#[cfg(test)]
mod tests {
    use super::super::store::{MemoryWidgetStore, PackageInfo, PackageManifest, ProvidedItems};
    use super::*;

    fn widget(version: &str, device_type: Option<&str>) -> WidgetDefinition {
        serde_json::from_value(serde_json::json!({
            "widgetVersion": version,
            "type": device_type,
        }))
        .unwrap()
    }

    fn package(id: &str, device_types: &[&str], widgets: &[&str]) -> PackageInfo {
        PackageInfo {
            id: id.to_string(),
            manifest: PackageManifest {
                name: None,
                device_types: device_types.iter().map(|s| s.to_string()).collect(),
                provides: ProvidedItems {
                    widgets: widgets.iter().map(|s| s.to_string()).collect(),
                    icon_sets: vec![],
                },
            },
        }
    }

    #[test]
    fn explicit_reference_wins() {
        let store = Arc::new(MemoryWidgetStore::new());
        store.add_builtin("dimmer", widget("0.1.5", None));
        store.add_packaged("com.acme.light", "fancyDimmer", widget("0.1.5", Some("dimmer")));

        let resolver = WidgetResolver::new(store);
        let resolved = resolver
            .resolve("dimmer", Some("com.acme.light/fancyDimmer"))
            .unwrap();
        assert_eq!(resolved.package.as_deref(), Some("com.acme.light"));
    }

    #[test]
    fn mapping_beats_builtin() {
        let store = Arc::new(MemoryWidgetStore::new());
        store.add_builtin("dimmer", widget("0.1.5", None));
        store.add_packaged("com.acme.light", "fancyDimmer", widget("0.1.5", Some("dimmer")));
        store
            .set_mapping(
                "dimmer",
                WidgetMapping {
                    package: "com.acme.light".to_string(),
                    widget: "fancyDimmer".to_string(),
                },
            )
            .unwrap();

        let resolver = WidgetResolver::new(store);
        let resolved = resolver.resolve("dimmer", None).unwrap();
        assert_eq!(resolved.package.as_deref(), Some("com.acme.light"));
    }

    #[test]
    fn builtin_by_type_name() {
        let store = Arc::new(MemoryWidgetStore::new());
        store.add_builtin("binarySwitch", widget("0.1.5", None));

        let resolver = WidgetResolver::new(store);
        let resolved = resolver.resolve("binarySwitch", None).unwrap();
        assert_eq!(resolved.package.as_deref(), Some(BUILTIN_PACKAGE));
    }

    #[test]
    fn package_search_tie_break_is_lexicographic() {
        let store = Arc::new(MemoryWidgetStore::new());
        store.add_package(package("com.zeta.stuff", &["thermostat"], &["thermo"]));
        store.add_package(package("com.acme.hvac", &["thermostat"], &["thermo"]));
        store.add_packaged("com.zeta.stuff", "thermo", widget("0.1.5", Some("thermostat")));
        store.add_packaged("com.acme.hvac", "thermo", widget("0.1.5", Some("thermostat")));

        let resolver = WidgetResolver::new(store);
        let resolved = resolver.resolve("thermostat", None).unwrap();
        assert_eq!(resolved.package.as_deref(), Some("com.acme.hvac"));
    }

    #[test]
    fn unknown_type_is_none() {
        let resolver = WidgetResolver::new(Arc::new(MemoryWidgetStore::new()));
        assert!(resolver.resolve("hoverboard", None).is_none());
    }

    #[test]
    fn incompatible_version_is_rejected() {
        let store = Arc::new(MemoryWidgetStore::new());
        store.add_builtin("oldSwitch", widget("0.1.4", None));
        store.add_builtin("futureSwitch", widget("1.0.0", None));

        let resolver = WidgetResolver::new(store);
        assert!(resolver.resolve("oldSwitch", None).is_none());
        assert!(resolver.resolve("futureSwitch", None).is_none());
    }

    #[test]
    fn resolution_is_cached() {
        let store = Arc::new(MemoryWidgetStore::new());
        store.add_builtin("dimmer", widget("0.1.5", None));

        let resolver = WidgetResolver::new(Arc::clone(&store) as Arc<dyn WidgetStore>);
        let first = resolver.resolve("dimmer", None).unwrap();
        let second = resolver.resolve("dimmer", None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn icon_set_basic_load() {
        let store = Arc::new(MemoryWidgetStore::new());
        store.add_icon_dir(None, "dimLight", &["on.svg", "off.svg", "notes.txt"]);

        let resolver = WidgetResolver::new(store);
        let icons = resolver.load_icon_set("dimLight", None);
        assert_eq!(icons.get("on").unwrap(), "icons/dimLight/on.svg");
        assert_eq!(icons.get("off").unwrap(), "icons/dimLight/off.svg");
        // Unsupported extensions are skipped
        assert!(icons.get("notes").is_none());
    }

    #[test]
    fn builtin_request_falls_back_to_root() {
        let store = Arc::new(MemoryWidgetStore::new());
        // Only the legacy root-level location exists
        store.add_icon_dir(None, "dimLight", &["on.svg"]);

        let resolver = WidgetResolver::new(store);
        let icons = resolver.load_icon_set("dimLight", Some(BUILTIN_PACKAGE));
        assert_eq!(icons.get("on").unwrap(), "icons/dimLight/on.svg");
    }

    #[test]
    fn root_request_falls_back_to_builtin() {
        let store = Arc::new(MemoryWidgetStore::new());
        store.add_icon_dir(Some(BUILTIN_PACKAGE), "defaultButton", &["icon.png"]);

        let resolver = WidgetResolver::new(store);
        let icons = resolver.load_icon_set("defaultButton", None);
        assert_eq!(
            icons.get("icon").unwrap(),
            "icons/built-in/defaultButton/icon.png"
        );
    }

    #[test]
    fn legacy_path_forms_normalize() {
        let store = Arc::new(MemoryWidgetStore::new());
        store.add_icon_dir(Some(BUILTIN_PACKAGE), "dimLight", &["on.svg"]);
        store.add_icon_dir(Some("com.acme.light"), "fancy", &["icon.svg"]);
        store.add_icon_dir(None, "user", &["icon.svg"]);

        let resolver = WidgetResolver::new(store);
        assert!(resolver
            .load_icon_set("icons/built-in/dimLight", None)
            .contains_key("on"));
        assert!(resolver
            .load_icon_set("icons/packages/com.acme.light/fancy", None)
            .contains_key("icon"));
        assert!(resolver.load_icon_set("icons/user", None).contains_key("icon"));
    }

    #[test]
    fn missing_icon_set_is_empty_map() {
        let resolver = WidgetResolver::new(Arc::new(MemoryWidgetStore::new()));
        assert!(resolver.load_icon_set("ghost", None).is_empty());
    }
}
