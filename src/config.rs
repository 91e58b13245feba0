// src/config.rs

//! Runtime configuration
//!
//! Loaded once at startup from TOML and shared read-only (`Arc<AioConfig>`)
//! by every component. Every section falls back to the defaults below, so an
//! empty or missing file yields a working configuration for a stock BlackArch
//! install.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/blackarch-aio/config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AioConfig {
    pub paths: PathsConfig,
    pub privilege: PrivilegeConfig,
    pub mirrors: MirrorConfig,
    pub snapshots: SnapshotConfig,
    pub update: UpdateConfig,
    pub install: InstallConfig,
}

impl AioConfig {
    /// Load from an explicit path, or the default path when present
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file silently yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::from_file(default)
                } else {
                    debug!("No configuration at {}, using defaults", DEFAULT_CONFIG_PATH);
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Filesystem locations touched by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub pacman_conf: PathBuf,
    pub mirrorlist: PathBuf,
    /// Reflector writes here first; only a successful tier replaces `mirrorlist`
    pub mirrorlist_staging: PathBuf,
    pub db_lock: PathBuf,
    pub run_lock: PathBuf,
    pub completion_marker: PathBuf,
    pub modules_dir: PathBuf,
    pub lib_dir: PathBuf,
    pub dracut_conf: PathBuf,
    pub kernel_install_conf: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            pacman_conf: PathBuf::from("/etc/pacman.conf"),
            mirrorlist: PathBuf::from("/etc/pacman.d/mirrorlist"),
            mirrorlist_staging: PathBuf::from("/etc/pacman.d/mirrorlist.aio-staging"),
            db_lock: PathBuf::from("/var/lib/pacman/db.lck"),
            run_lock: PathBuf::from("/run/lock/blackarch-aio.lock"),
            completion_marker: PathBuf::from(".update_done"),
            modules_dir: PathBuf::from("/usr/lib/modules"),
            lib_dir: PathBuf::from("/usr/lib"),
            dracut_conf: PathBuf::from("/etc/dracut.conf.d/99-fix-boot.conf"),
            kernel_install_conf: PathBuf::from("/etc/kernel/install.conf"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivilegeConfig {
    /// Prefix privileged commands with `sudo` when not already root
    pub use_sudo: bool,
}

impl Default for PrivilegeConfig {
    fn default() -> Self {
        Self { use_sudo: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub geolocation_url: String,
    pub geolocation_timeout_secs: u64,
    /// Wall-clock bound for a single reflector tier
    pub tier_timeout_secs: u64,
    pub connection_timeout_secs: u32,
    pub download_timeout_secs: u32,
    pub threads: u32,
}

impl MirrorConfig {
    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_secs(self.geolocation_timeout_secs)
    }

    pub fn tier_timeout(&self) -> Duration {
        Duration::from_secs(self.tier_timeout_secs)
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            geolocation_url: "http://ipinfo.io/json".to_string(),
            geolocation_timeout_secs: 5,
            tier_timeout_secs: 120,
            connection_timeout_secs: 3,
            download_timeout_secs: 5,
            threads: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Set to false to skip the snapper probe entirely
    pub enabled: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Processes killed before privileged package-database access
    pub competing_processes: Vec<String>,
    pub keyrings: Vec<String>,
    pub metapackages: Vec<String>,
    pub strap_url: String,
    /// Checked in order; the first needle found in a missing name wins
    pub umbrella_packages: Vec<UmbrellaPackage>,
}

/// A missing target containing `needle` is satisfied by installing `package`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UmbrellaPackage {
    pub needle: String,
    pub package: String,
}

impl UmbrellaPackage {
    pub fn new(needle: &str, package: &str) -> Self {
        Self {
            needle: needle.to_string(),
            package: package.to_string(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            competing_processes: ["pacman", "yay", "paru", "packagekitd"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            keyrings: vec![
                "archlinux-keyring".to_string(),
                "blackarch-keyring".to_string(),
            ],
            metapackages: vec!["blackarch-officials".to_string()],
            strap_url: "https://blackarch.org/strap.sh".to_string(),
            umbrella_packages: vec![
                UmbrellaPackage::new("nodejs", "nodejs"),
                UmbrellaPackage::new("llvm", "llvm"),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Packages the installer must get onto the system before categories
    pub packages: Vec<String>,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            packages: vec!["blackarch".to_string(), "blackarch-officials".to_string()],
        }
    }
}
