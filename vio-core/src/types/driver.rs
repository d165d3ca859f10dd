//! Driver metadata.
//!
//! Drivers that need extra steps before a bind succeeds carry capability tags
//! instead of being special-cased by name.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// VFIO-PCI driver name.
pub const VFIO_PCI_DRIVER: &str = "vfio-pci";

/// Whether `name` can only name a single entry under `bus/pci/drivers`.
pub fn is_valid_driver_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == '\0' || c.is_whitespace())
}

/// Capabilities of a kernel driver that matter for binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverProfile {
    /// Driver name as it appears under `bus/pci/drivers`
    pub name: String,
    /// Kernel module to load when the driver is not registered (defaults to `name`)
    #[serde(default)]
    pub module: Option<String>,
    /// Try loading the module when the driver directory is missing
    #[serde(default)]
    pub needs_module_load: bool,
    /// The driver only claims vendor/device pairs written to its `new_id` control
    #[serde(default)]
    pub needs_identity_registration: bool,
}

impl DriverProfile {
    /// Profile for a driver without quirks.
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: None,
            needs_module_load: false,
            needs_identity_registration: false,
        }
    }

    /// The generic pass-through driver.
    pub fn vfio_pci() -> Self {
        Self {
            name: VFIO_PCI_DRIVER.to_string(),
            module: Some(VFIO_PCI_DRIVER.to_string()),
            needs_module_load: true,
            needs_identity_registration: true,
        }
    }

    /// Module to hand to the loader.
    pub fn module_name(&self) -> &str {
        self.module.as_deref().unwrap_or(&self.name)
    }
}

/// Lookup table of driver profiles.
#[derive(Debug, Clone)]
pub struct DriverCatalog {
    profiles: HashMap<String, DriverProfile>,
}

impl Default for DriverCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DriverCatalog {
    /// Catalog with the built-in profiles.
    pub fn builtin() -> Self {
        let mut profiles = HashMap::new();
        let vfio = DriverProfile::vfio_pci();
        profiles.insert(vfio.name.clone(), vfio);
        Self { profiles }
    }

    /// Add or replace profiles.
    pub fn with_profiles(mut self, extra: impl IntoIterator<Item = DriverProfile>) -> Self {
        for profile in extra {
            self.profiles.insert(profile.name.clone(), profile);
        }
        self
    }

    /// Profile for `driver`; unknown drivers get a plain profile.
    pub fn profile(&self, driver: &str) -> DriverProfile {
        self.profiles.get(driver).cloned().unwrap_or_else(|| DriverProfile::plain(driver))
    }
}
