//! Figment-based configuration loading.
//!
//! Configuration priority (highest wins):
//! 1. CLI arguments (applied after Figment load)
//! 2. Config file (TOML)
//! 3. Environment variables (`ISTHMUS_` prefix, `__` between sections)
//! 4. Defaults

use std::path::Path;

use eyre::{Result, WrapErr};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use isthmus_topology::{ExecutorConfig, ResolverConfig};
use serde::{Deserialize, Serialize};

/// Complete tool configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsthmusConfig {
    /// Structural validation.
    pub resolver: ResolverConfig,

    /// Plan execution.
    pub executor: ExecutorConfig,
}

impl IsthmusConfig {
    /// Load configuration from defaults, environment, and config file.
    /// CLI overrides should be applied separately after loading.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(IsthmusConfig::default()))
            .merge(Env::prefixed("ISTHMUS_").split("__"));

        if let Some(path) = config_path {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        figment.extract().wrap_err("Failed to load configuration")
    }
}
