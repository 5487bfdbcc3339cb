//! Configuration management for a configuration-store node.
//!
//! Sources are merged with priority:
//! 1. Default values (hardcoded)
//! 2. Optional TOML file (explicit path or `CONFIG_PATH`)
//! 3. Environment variables with the `LABKV` prefix (highest priority)

mod bus;
mod cache;
mod cluster;
mod monitoring;
mod retry;
pub use bus::*;
pub use cache::*;
pub use cluster::*;
pub use monitoring::*;
pub use retry::*;

#[cfg(test)]
mod config_test;

//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Cluster identity and peer addressing
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Revisioned cache parameters
    #[serde(default)]
    pub cache: CacheConfig,
    /// Notification bus batching and observer accounting
    #[serde(default)]
    pub bus: BusConfig,
    /// Refresh-loop backoff policy
    #[serde(default)]
    pub retry: BackoffPolicy,
    /// Metrics endpoint settings
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl Settings {
    /// Load configuration with file and environment overlays.
    ///
    /// # Arguments
    /// * `config_path` - Optional path to a TOML file; falls back to the
    ///   `CONFIG_PATH` environment variable when absent.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        } else if let Ok(path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("LABKV")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true)
                .with_list_parse_key("cluster.peer_seeds")
                .list_separator(","),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates all subsections; called automatically by [`Settings::load`].
    pub fn validate(&self) -> Result<()> {
        self.cluster.validate()?;
        self.cache.validate()?;
        self.bus.validate()?;
        self.monitoring.validate()?;
        Ok(())
    }
}
