//! Daemon settings.

use crate::error::{Result, VioError};
use crate::paths;
use crate::sriov::{SettlePolicy, SysfsLayout};
use crate::types::{is_valid_driver_name, DriverCatalog, DriverProfile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persistent settings for viod.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding `*.conf` descriptors
    pub config_dir: PathBuf,
    /// Root of the kernel device model
    pub sysfs_root: PathBuf,
    pub log_level: String,
    /// Quiet period after a change before a reload pass runs
    pub reload_debounce_ms: u64,
    /// Watch the descriptor directory for changes
    pub watch: bool,
    pub settle: SettlePolicy,
    /// Extra driver profiles, merged over the built-in ones
    pub drivers: Vec<DriverProfile>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_dir: paths::config_dir(),
            sysfs_root: paths::sysfs_root(),
            log_level: "info".to_string(),
            reload_debounce_ms: 1_000,
            watch: true,
            settle: SettlePolicy::default(),
            drivers: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| VioError::InvalidConfig {
            reason: format!("Failed to read settings {}: {}", path.display(), e),
        })?;
        let settings: Self = serde_json::from_str(&content).map_err(|e| VioError::InvalidConfig {
            reason: format!("Failed to parse settings {}: {}", path.display(), e),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if let Some(profile) = self.drivers.iter().find(|p| !is_valid_driver_name(&p.name)) {
            return Err(VioError::InvalidConfig {
                reason: format!("driver profile with invalid name: {:?}", profile),
            });
        }
        Ok(())
    }

    /// Driver catalog: built-in profiles plus the configured ones.
    pub fn catalog(&self) -> DriverCatalog {
        DriverCatalog::builtin().with_profiles(self.drivers.iter().cloned())
    }

    pub fn layout(&self) -> SysfsLayout {
        SysfsLayout::new(self.sysfs_root.clone())
    }
}
