use super::{WidgetDefinition, BUILTIN_PACKAGE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{error, warn};

/// Persisted deviceType -> (package, widget) mapping entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetMapping {
    pub package: String,
    pub widget: String,
}

/// Installed package manifest, as far as resolution cares
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "deviceTypes", default)]
    pub device_types: Vec<String>,
    #[serde(default)]
    pub provides: ProvidedItems,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidedItems {
    #[serde(default)]
    pub widgets: Vec<String>,
    #[serde(rename = "iconSets", default)]
    pub icon_sets: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub id: String,
    pub manifest: PackageManifest,
}

/// Package/widget-mapping collaborator: widget definitions, installed package
/// manifests, the type->widget mapping table, and icon set directories.
///
/// Read-only from the engine's perspective except the mapping upsert.
pub trait WidgetStore: Send + Sync {
    /// Built-in widget by name; `None` when absent or unreadable.
    fn load_builtin(&self, name: &str) -> Option<WidgetDefinition>;

    /// Widget from an installed package.
    fn load_packaged(&self, package: &str, widget: &str) -> Option<WidgetDefinition>;

    fn mapping_for(&self, device_type: &str) -> Option<WidgetMapping>;

    fn set_mapping(&self, device_type: &str, mapping: WidgetMapping) -> Result<()>;

    fn remove_mapping(&self, device_type: &str) -> Result<()>;

    /// Installed package manifests.
    fn packages(&self) -> Vec<PackageInfo>;

    /// File names inside an icon set directory; `None` when the directory
    /// does not exist.
    fn list_icon_files(&self, package: Option<&str>, set: &str) -> Option<Vec<String>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MappingsFile {
    #[serde(default = "default_mappings_version")]
    version: String,
    #[serde(default)]
    mappings: BTreeMap<String, WidgetMapping>,
}

fn default_mappings_version() -> String {
    "1.0".to_string()
}

#[derive(Debug, Default, Deserialize)]
struct PackagesFile {
    #[serde(default)]
    packages: BTreeMap<String, PackageEntry>,
}

#[derive(Debug, Deserialize)]
struct PackageEntry {
    manifest: PackageManifest,
}

/// Filesystem-backed store rooted at the app data directory:
/// `widgets/built-in/`, `widgets/packages/<pkg>/`, legacy root `widgets/`,
/// `icons/…`, `widget-mappings.json`, `packages.json`.
pub struct FsWidgetStore {
    data_dir: PathBuf,
    mappings: RwLock<MappingsFile>,
    packages: Vec<PackageInfo>,
}

impl FsWidgetStore {
    pub fn open(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        let mappings = read_json::<MappingsFile>(&data_dir.join("widget-mappings.json"))
            .unwrap_or_default();
        let packages = read_json::<PackagesFile>(&data_dir.join("packages.json"))
            .unwrap_or_default()
            .packages
            .into_iter()
            .map(|(id, entry)| PackageInfo {
                id,
                manifest: entry.manifest,
            })
            .collect();

        Self {
            data_dir,
            mappings: RwLock::new(mappings),
            packages,
        }
    }

    fn load_widget_file(&self, path: &Path, package: &str) -> Option<WidgetDefinition> {
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str::<WidgetDefinition>(&contents) {
            Ok(mut widget) => {
                widget.package = Some(package.to_string());
                Some(widget)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to parse widget definition");
                None
            }
        }
    }

    fn save_mappings(&self, mappings: &MappingsFile) -> Result<()> {
        let path = self.data_dir.join("widget-mappings.json");
        let json = serde_json::to_string_pretty(mappings)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

impl WidgetStore for FsWidgetStore {
    fn load_builtin(&self, name: &str) -> Option<WidgetDefinition> {
        let builtin = self
            .data_dir
            .join("widgets")
            .join("built-in")
            .join(format!("{}.json", name));
        if let Some(widget) = self.load_widget_file(&builtin, BUILTIN_PACKAGE) {
            return Some(widget);
        }
        // Legacy layout kept widgets at the directory root
        let legacy = self.data_dir.join("widgets").join(format!("{}.json", name));
        self.load_widget_file(&legacy, BUILTIN_PACKAGE)
    }

    fn load_packaged(&self, package: &str, widget: &str) -> Option<WidgetDefinition> {
        let path = self
            .data_dir
            .join("widgets")
            .join("packages")
            .join(package)
            .join(format!("{}.json", widget));
        self.load_widget_file(&path, package)
    }

    fn mapping_for(&self, device_type: &str) -> Option<WidgetMapping> {
        self.mappings
            .read()
            .ok()?
            .mappings
            .get(device_type)
            .cloned()
    }

    fn set_mapping(&self, device_type: &str, mapping: WidgetMapping) -> Result<()> {
        let mut mappings = self
            .mappings
            .write()
            .map_err(|_| anyhow::anyhow!("mappings lock poisoned"))?;
        mappings.mappings.insert(device_type.to_string(), mapping);
        self.save_mappings(&mappings)
    }

    fn remove_mapping(&self, device_type: &str) -> Result<()> {
        let mut mappings = self
            .mappings
            .write()
            .map_err(|_| anyhow::anyhow!("mappings lock poisoned"))?;
        mappings.mappings.remove(device_type);
        self.save_mappings(&mappings)
    }

    fn packages(&self) -> Vec<PackageInfo> {
        self.packages.clone()
    }

    fn list_icon_files(&self, package: Option<&str>, set: &str) -> Option<Vec<String>> {
        let dir = match package {
            Some(BUILTIN_PACKAGE) => self.data_dir.join("icons").join("built-in").join(set),
            Some(pkg) => self
                .data_dir
                .join("icons")
                .join("packages")
                .join(pkg)
                .join(set),
            None => self.data_dir.join("icons").join(set),
        };
        let entries = std::fs::read_dir(&dir).ok()?;
        let mut files: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        files.sort();
        Some(files)
    }
}

/// In-memory store for tests and embedding without a data directory.
#[derive(Default)]
pub struct MemoryWidgetStore {
    builtins: RwLock<BTreeMap<String, WidgetDefinition>>,
    packaged: RwLock<BTreeMap<(String, String), WidgetDefinition>>,
    mappings: RwLock<BTreeMap<String, WidgetMapping>>,
    packages: RwLock<Vec<PackageInfo>>,
    icon_dirs: RwLock<BTreeMap<(String, String), Vec<String>>>,
}

impl MemoryWidgetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_builtin(&self, name: &str, widget: WidgetDefinition) {
        if let Ok(mut builtins) = self.builtins.write() {
            builtins.insert(name.to_string(), widget);
        }
    }

    pub fn add_packaged(&self, package: &str, name: &str, widget: WidgetDefinition) {
        if let Ok(mut packaged) = self.packaged.write() {
            packaged.insert((package.to_string(), name.to_string()), widget);
        }
    }

    pub fn add_package(&self, info: PackageInfo) {
        if let Ok(mut packages) = self.packages.write() {
            packages.push(info);
        }
    }

    pub fn add_icon_dir(&self, package: Option<&str>, set: &str, files: &[&str]) {
        if let Ok(mut icon_dirs) = self.icon_dirs.write() {
            icon_dirs.insert(
                (package.unwrap_or("").to_string(), set.to_string()),
                files.iter().map(|f| f.to_string()).collect(),
            );
        }
    }
}

impl WidgetStore for MemoryWidgetStore {
    fn load_builtin(&self, name: &str) -> Option<WidgetDefinition> {
        let mut widget = self.builtins.read().ok()?.get(name).cloned()?;
        widget.package = Some(BUILTIN_PACKAGE.to_string());
        Some(widget)
    }

    fn load_packaged(&self, package: &str, widget: &str) -> Option<WidgetDefinition> {
        let mut def = self
            .packaged
            .read()
            .ok()?
            .get(&(package.to_string(), widget.to_string()))
            .cloned()?;
        def.package = Some(package.to_string());
        Some(def)
    }

    fn mapping_for(&self, device_type: &str) -> Option<WidgetMapping> {
        self.mappings.read().ok()?.get(device_type).cloned()
    }

    fn set_mapping(&self, device_type: &str, mapping: WidgetMapping) -> Result<()> {
        let mut mappings = self
            .mappings
            .write()
            .map_err(|_| anyhow::anyhow!("mappings lock poisoned"))?;
        mappings.insert(device_type.to_string(), mapping);
        Ok(())
    }

    fn remove_mapping(&self, device_type: &str) -> Result<()> {
        let mut mappings = self
            .mappings
            .write()
            .map_err(|_| anyhow::anyhow!("mappings lock poisoned"))?;
        mappings.remove(device_type);
        Ok(())
    }

    fn packages(&self) -> Vec<PackageInfo> {
        self.packages
            .read()
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    fn list_icon_files(&self, package: Option<&str>, set: &str) -> Option<Vec<String>> {
        self.icon_dirs
            .read()
            .ok()?
            .get(&(package.unwrap_or("").to_string(), set.to_string()))
            .cloned()
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let contents = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to parse JSON file, using defaults");
            None
        }
    }
}
