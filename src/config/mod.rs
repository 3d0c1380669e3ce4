use anyhow::{Context, Result};
use serde::Deserialize;

/// Complete HomeMap configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HomemapConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Controller connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Server-side long-poll timeout passed as a query parameter (seconds)
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_seconds: u64,
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_poll_timeout() -> u64 {
    30
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            host: String::new(),
            user: String::new(),
            password: String::new(),
            poll_timeout_seconds: default_poll_timeout(),
        }
    }
}

/// Remote widget WebSocket server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_server_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_server_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Root of widgets/, icons/ and persisted state
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Placement records file, relative to data_dir
    #[serde(default = "default_placements_file")]
    pub placements_file: String,
}

fn default_data_dir() -> String {
    ".".to_string()
}

fn default_placements_file() -> String {
    "remote-widgets.json".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            placements_file: default_placements_file(),
        }
    }
}

impl Default for HomemapConfig {
    fn default() -> Self {
        Self {
            controller: ControllerConfig::default(),
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<HomemapConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: HomemapConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path))?;
    Ok(config)
}
