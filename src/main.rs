use anyhow::Result;
use homemap::config::{load_config, HomemapConfig};
use homemap::controller::ControllerClient;
use homemap::remote::{self, JsonPlacementStore};
use homemap::scene;
use homemap::widget::{FsWidgetStore, WidgetResolver};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "homemap=info".into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = match load_config(&config_path) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %config_path, error = %e, "Config not loaded, using defaults");
            HomemapConfig::default()
        }
    };

    info!("HomeMap engine starting...");

    let store = Arc::new(FsWidgetStore::open(config.storage.data_dir.as_str()));
    let resolver = Arc::new(WidgetResolver::new(store));
    let scene_handle = scene::spawn(Arc::clone(&resolver));

    let stop = Arc::new(AtomicBool::new(false));
    if config.controller.host.is_empty() {
        warn!("No controller host configured, change feed disabled");
    } else {
        let client = ControllerClient::new(&config.controller)?;
        tokio::spawn(scene::run_poll_loop(
            client,
            scene_handle.clone(),
            Arc::clone(&stop),
        ));
    }

    let placements = Arc::new(JsonPlacementStore::new(
        Path::new(&config.storage.data_dir).join(&config.storage.placements_file),
    ));
    let engine = remote::engine::spawn(placements);

    if config.server.enabled {
        remote::run_server(&config.server.bind_address, config.server.port, engine).await?;
    } else {
        info!("Remote widget server disabled");
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}
