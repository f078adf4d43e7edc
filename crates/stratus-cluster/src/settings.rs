//! Settings for stratus.

use std::path::{Path, PathBuf};

use figment::providers::{Data, Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::config::ClusterConfig;
use crate::error::{ClusterError, ClusterResult};

/// Default directory for generated cluster configs.
pub const DEFAULT_CONFIG_DIR: &str = "~/.stratus/cloud";

/// Environment variable prefix for settings.
pub const ENV_PREFIX: &str = "STRATUS_";

/// Top-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StratusSettings {
    /// Directory generated cluster configs are written to.
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// SOCKS proxy address SSH connections are tunnelled through.
    #[serde(default)]
    pub socks_proxy: Option<String>,

    /// Base template file; the embedded template when unset.
    #[serde(default)]
    pub template: Option<PathBuf>,

    /// Provisioning tool settings.
    #[serde(default)]
    pub ray: RaySettings,
}

fn default_config_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_DIR)
}

impl Default for StratusSettings {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            socks_proxy: None,
            template: None,
            ray: RaySettings::default(),
        }
    }
}

/// Provisioning tool settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RaySettings {
    /// Path to the `ray` binary; looked up on `PATH` when unset.
    #[serde(default)]
    pub binary: Option<PathBuf>,
}

impl StratusSettings {
    /// Load settings from the default sources.
    ///
    /// Later sources override earlier ones:
    /// 1. Default values
    /// 2. `stratus.toml` in the current directory (if present)
    /// 3. Environment variables with the `STRATUS_` prefix
    pub fn load() -> ClusterResult<Self> {
        Self::figment(Toml::file("stratus.toml"))
            .extract()
            .map_err(|e| ClusterError::config(e.to_string()))
    }

    /// Load settings from a specific TOML file, still honouring the environment.
    pub fn from_file(path: impl AsRef<Path>) -> ClusterResult<Self> {
        Self::figment(Toml::file(path.as_ref()))
            .extract()
            .map_err(|e| ClusterError::config(e.to_string()))
    }

    fn figment(file: Data<Toml>) -> Figment {
        Figment::new()
            .merge(file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Config directory with `~` expanded.
    #[must_use]
    pub fn resolved_config_dir(&self) -> PathBuf {
        expand(&self.config_dir)
    }

    /// The base template to build cluster configs from.
    pub fn base_template(&self) -> ClusterResult<ClusterConfig> {
        match &self.template {
            Some(path) => ClusterConfig::load(&expand(path)),
            None => ClusterConfig::base_template(),
        }
    }
}

fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(raw.as_ref()).as_ref())
}
