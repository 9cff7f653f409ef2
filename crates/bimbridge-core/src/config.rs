//! Engine configuration structs.
//!
//! All configuration is explicit and constructor-injected; there are no
//! process-wide mutable settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the script hot-loader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotLoaderConfig {
    /// Directory where materialized script artifacts live.
    pub cache_dir: PathBuf,
    /// Artifacts and cache entries older than this are swept by `cleanup`.
    pub max_artifact_age: Duration,
}

impl Default for HotLoaderConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("bimbridge-scripts"),
            max_artifact_age: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Liveness ping interval while a command runs.
    pub ping_interval: Duration,
    pub hot_loader: HotLoaderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(2),
            hot_loader: HotLoaderConfig::default(),
        }
    }
}
