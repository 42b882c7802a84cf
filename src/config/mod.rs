//! Configuration System
//!
//! Configuration is read from a cascade of YAML files, lowest priority first:
//! 1. `/etc/ospf-engine/ospf.yaml`
//! 2. `<user config dir>/ospf-engine/ospf.yaml`
//! 3. `~/.ospf.yaml`
//! 4. `./ospf.yaml`
//!
//! Later files override the values set by earlier ones.
//!
//! # YAML Structure
//!
//! ```yaml
//! router:
//!   router_id: 10.0.0.1
//!   timers:
//!     max_age_secs: 3600
//!     ls_refresh_secs: 1800
//! areas:
//!   - area_id: 0.0.0.0
//!     interfaces:
//!       - name: eth0
//!         address: 192.168.1.1
//!         kind: point_to_point
//! ```

mod area;
mod router;

use crate::{AreaId, RouterId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use area::{AreaConfig, InterfaceConfig, InterfaceKind};
pub use router::{AdjacencyConfig, RouterConfig, TimersConfig};

/// File name looked for in every search directory.
const CONFIG_FILENAME: &str = "ospf.yaml";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("router.router_id is not set")]
    MissingRouterId,

    #[error("invalid timers: {0}")]
    InvalidTimers(String),

    #[error("area {0} configured more than once")]
    DuplicateArea(AreaId),

    #[error("interface {interface} in area {area}: {reason}")]
    InvalidInterface {
        area: AreaId,
        interface: String,
        reason: String,
    },
}

/// Top-level configuration: router-wide settings plus one entry per area.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Router-wide settings (`router.*`).
    #[serde(default)]
    pub router: RouterConfig,

    /// Configured areas (`areas`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub areas: Vec<AreaConfig>,
}

impl Config {
    /// Configuration with every default and no areas.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and merge every file found on the search paths.
    ///
    /// Also returns the files that were actually read.
    pub fn load() -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let search_paths = Self::search_paths();
        Self::load_from_paths(&search_paths)
    }

    /// Load and merge `paths`, skipping any that do not exist.
    ///
    /// Later paths win.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut config = Config::default();
        let mut loaded_paths = Vec::new();

        for path in paths {
            if path.exists() {
                let file_config = Self::load_file(path)?;
                config.merge(file_config);
                loaded_paths.push(path.clone());
            }
        }

        Ok((config, loaded_paths))
    }

    /// Parse one YAML file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Search paths, lowest priority first.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // System-wide
        paths.push(PathBuf::from("/etc/ospf-engine").join(CONFIG_FILENAME));

        // User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("ospf-engine").join(CONFIG_FILENAME));
        }

        // Home directory
        if let Some(home_dir) = dirs::home_dir() {
            paths.push(home_dir.join(".ospf.yaml"));
        }

        // Working directory wins
        paths.push(PathBuf::from(".").join(CONFIG_FILENAME));

        paths
    }

    /// Overlay `other` on top of this configuration.
    ///
    /// Fields left at their defaults in `other` do not override.
    pub fn merge(&mut self, other: Config) {
        if other.router.router_id.is_some() {
            self.router.router_id = other.router.router_id;
        }
        self.router.timers.merge(other.router.timers);
        if other.router.adjacency != AdjacencyConfig::default() {
            self.router.adjacency = other.router.adjacency;
        }
        // Areas (replace if non-empty)
        if !other.areas.is_empty() {
            self.areas = other.areas;
        }
    }

    /// Configured router ID, required to run.
    pub fn router_id(&self) -> Result<RouterId, ConfigError> {
        self.router.router_id.ok_or(ConfigError::MissingRouterId)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.router_id()?;

        let timers = &self.router.timers;
        if timers.max_age_secs == 0 {
            return Err(ConfigError::InvalidTimers(
                "max_age_secs must be positive".to_string(),
            ));
        }
        if timers.ls_refresh_secs >= timers.max_age_secs {
            return Err(ConfigError::InvalidTimers(format!(
                "ls_refresh_secs ({}) must be below max_age_secs ({})",
                timers.ls_refresh_secs, timers.max_age_secs
            )));
        }
        if timers.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidTimers(
                "tick_interval_ms must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for area in &self.areas {
            if !seen.insert(area.area_id) {
                return Err(ConfigError::DuplicateArea(area.area_id));
            }
            for iface in &area.interfaces {
                let invalid = |reason: &str| ConfigError::InvalidInterface {
                    area: area.area_id,
                    interface: iface.name.clone(),
                    reason: reason.to_string(),
                };
                if iface.hello_interval_secs == 0 {
                    return Err(invalid("hello_interval_secs must be positive"));
                }
                if iface.router_dead_interval_secs <= u32::from(iface.hello_interval_secs) {
                    return Err(invalid("router_dead_interval_secs must exceed hello_interval_secs"));
                }
                if iface.retransmit_interval_secs == 0 {
                    return Err(invalid("retransmit_interval_secs must be positive"));
                }
                if !iface.static_neighbors.is_empty() && iface.kind != InterfaceKind::Nbma {
                    return Err(invalid("static_neighbors only apply to nbma interfaces"));
                }
            }
        }
        Ok(())
    }

    /// Render the effective configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
