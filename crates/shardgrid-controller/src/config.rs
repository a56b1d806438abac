//! Controller configuration, loaded from `shardgrid.toml`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use shardgrid_state::AssignmentStrategy;

use crate::retry::RetryPolicy;

/// Top-level controller configuration.
///
/// Every field has a default, so an empty file is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Directory holding the coordination store file.
    pub data_dir: PathBuf,
    /// Strategy used when a table request does not name one.
    pub default_strategy: AssignmentStrategy,
    pub retry: RetryPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/shardgrid"),
            default_strategy: AssignmentStrategy::BalanceNumSegment,
            retry: RetryPolicy::default(),
        }
    }
}

impl ControllerConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Serialize to a TOML string.
    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Path of the store file inside `data_dir`.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("shardgrid.redb")
    }
}
