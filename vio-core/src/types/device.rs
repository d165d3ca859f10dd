//! Physical function and virtual function descriptors.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Maximum number of VF slots a single descriptor may carry.
pub const MAX_VFS: usize = 256;

/// Class of the physical device.
///
/// Only network devices are addressed by interface name and accept
/// MAC/VLAN/promiscuous attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Network,
    Accelerator,
    #[default]
    Generic,
}

impl DeviceClass {
    /// Network devices are named by interface, everything else by bus address.
    pub fn is_network(&self) -> bool {
        matches!(self, DeviceClass::Network)
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceClass::Network => write!(f, "net"),
            DeviceClass::Accelerator => write!(f, "gpu"),
            DeviceClass::Generic => write!(f, "dev"),
        }
    }
}

impl std::str::FromStr for DeviceClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "net" | "network" => Ok(DeviceClass::Network),
            "gpu" | "accel" | "accelerator" => Ok(DeviceClass::Accelerator),
            "dev" | "generic" => Ok(DeviceClass::Generic),
            _ => Err(format!("Unknown device kind: {}", s)),
        }
    }
}

/// Desired state of one virtual function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfDescriptor {
    /// VF index under the parent; `None` means unconfigured (defaults to list position)
    pub index: Option<u32>,
    /// Kernel driver the VF should be bound to
    pub driver: Option<String>,
    /// MAC address (network class only)
    pub mac: Option<String>,
    /// VLAN ID (network class only, 0 = unset)
    pub vlan: u16,
}

impl VfDescriptor {
    /// A configured VF at `index`.
    pub fn at(index: u32) -> Self {
        Self { index: Some(index), ..Default::default() }
    }

    /// Index this descriptor applies to when it sits at `position` in the list.
    pub fn resolved_index(&self, position: usize) -> u32 {
        self.index.unwrap_or(position as u32)
    }

    /// Whether the descriptor requests anything at all.
    pub fn is_empty(&self) -> bool {
        self.driver.is_none() && self.mac.is_none() && self.vlan == 0
    }
}

/// Desired state of one physical function, as read from a single descriptor file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalFunctionDescriptor {
    /// Interface name (network) or bus address (accelerator/generic)
    pub handle: String,
    /// Device class
    pub class: DeviceClass,
    /// Number of VFs to create
    pub vf_count: u32,
    /// Put the PF interface in promiscuous mode (network only)
    pub promiscuous: bool,
    /// Per-slot VF descriptors, position == slot
    pub vfs: Vec<VfDescriptor>,
    /// File the descriptor was read from
    pub source: PathBuf,
}

impl PhysicalFunctionDescriptor {
    /// Create a descriptor with no per-VF configuration.
    pub fn new(handle: impl Into<String>, class: DeviceClass, vf_count: u32) -> Self {
        Self {
            handle: handle.into(),
            class,
            vf_count,
            promiscuous: false,
            vfs: Vec::new(),
            source: PathBuf::new(),
        }
    }

    /// Place `vf` at its own index, growing the slot list as needed.
    pub fn with_vf(mut self, vf: VfDescriptor) -> Self {
        let slot = vf.index.unwrap_or(self.vfs.len() as u32) as usize;
        if self.vfs.len() <= slot {
            self.vfs.resize_with(slot + 1, VfDescriptor::default);
        }
        self.vfs[slot] = vf;
        self
    }

    /// Descriptor for `slot`, or an unconfigured default past the end of the list.
    pub fn vf_at(&self, slot: usize) -> VfDescriptor {
        self.vfs.get(slot).cloned().unwrap_or_default()
    }

    /// Human-readable source for log lines.
    pub fn source_name(&self) -> String {
        if self.source.as_os_str().is_empty() {
            self.handle.clone()
        } else {
            self.source.display().to_string()
        }
    }
}
