//! Configuration loading

use anyhow::Result;
use roster_core::usb_ids::DEFAULT_USB_IDS_PATHS;
use roster_discovery::arp::DEFAULT_NEIGHBOR_COMMAND;
use roster_discovery::sysfs::DEFAULT_SYSFS_ROOT;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub lan: LanConfig,
    #[serde(default)]
    pub usb: UsbConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Path to the registry file
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
    /// Write the registry back after every command that may change it
    #[serde(default = "default_true")]
    pub autosave: bool,
    /// Indent the registry file
    #[serde(default = "default_true")]
    pub pretty: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            autosave: true,
            pretty: true,
        }
    }
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("./devices.json")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanConfig {
    /// Command printing the neighbor table, program first
    #[serde(default = "default_neighbor_command")]
    pub neighbor_command: Vec<String>,
    /// Use nmap to probe for hosts missing from the neighbor table
    #[serde(default = "default_true")]
    pub probe: bool,
    /// Directories searched for nmap (empty: PATH)
    #[serde(default)]
    pub nmap_search_path: Vec<PathBuf>,
}

impl Default for LanConfig {
    fn default() -> Self {
        Self {
            neighbor_command: default_neighbor_command(),
            probe: true,
            nmap_search_path: Vec::new(),
        }
    }
}

fn default_neighbor_command() -> Vec<String> {
    DEFAULT_NEIGHBOR_COMMAND.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsbConfig {
    /// sysfs directory listing USB devices
    #[serde(default = "default_sysfs_root")]
    pub sysfs_root: PathBuf,
    /// Candidate locations of the usb.ids name database, first readable wins
    #[serde(default = "default_ids_paths")]
    pub ids_paths: Vec<PathBuf>,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            sysfs_root: default_sysfs_root(),
            ids_paths: default_ids_paths(),
        }
    }
}

fn default_sysfs_root() -> PathBuf {
    PathBuf::from(DEFAULT_SYSFS_ROOT)
}

fn default_ids_paths() -> Vec<PathBuf> {
    DEFAULT_USB_IDS_PATHS.iter().map(PathBuf::from).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

/// Load configuration from file, falling back to defaults if it does not exist
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;
    Ok(())
}
