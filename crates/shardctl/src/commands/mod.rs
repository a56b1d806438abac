//! Subcommand implementations. Each returns the JSON value main prints.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use shardgrid_controller::{ControllerConfig, ResourceManager};
use shardgrid_state::StateStore;

pub mod instance;
pub mod segment;
pub mod table;
pub mod tenant;

/// Load the config file (or defaults) and apply the `--data-dir` override.
pub fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> anyhow::Result<ControllerConfig> {
    let mut config = match path {
        Some(path) => {
            let config = ControllerConfig::from_file(path)?;
            debug!(path = %path.display(), "config loaded");
            config
        }
        None => ControllerConfig::default(),
    };
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    Ok(config)
}

/// Open (creating if needed) the store under `data_dir`.
pub fn open_manager(config: &ControllerConfig) -> anyhow::Result<ResourceManager> {
    std::fs::create_dir_all(&config.data_dir)?;
    let path = config.store_path();
    let store = StateStore::open(&path)?;
    info!(path = %path.display(), "state store opened");
    Ok(ResourceManager::new(Arc::new(store), config))
}

pub fn status(manager: &ResourceManager) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::to_value(manager.status()?)?)
}
