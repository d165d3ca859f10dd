//! Bus-address resolution for physical functions and their VFs.

use crate::error::{Result, VioError};
use crate::sriov::control::{link_name, DeviceControlPlane, SysfsLayout};
use crate::types::DeviceClass;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

/// Regular expression to validate PCI address format: 0000:01:00.0
static PCI_ADDRESS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{4}:[0-9a-fA-F]{2}:[0-9a-fA-F]{2}\.[0-7]$")
        .expect("Invalid PCI address regex")
});

/// Validate PCI address format.
pub fn is_valid_pci_address(address: &str) -> bool {
    PCI_ADDRESS_REGEX.is_match(address)
}

/// Whether `name` can name a single entry under `class/net`.
fn is_interface_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

/// Resolves device handles to canonical bus addresses.
///
/// Nothing is cached: every call follows the kernel's links again.
#[derive(Clone)]
pub struct AddressResolver {
    control: Arc<dyn DeviceControlPlane>,
    layout: SysfsLayout,
}

impl AddressResolver {
    pub fn new(control: Arc<dyn DeviceControlPlane>, layout: SysfsLayout) -> Self {
        Self { control, layout }
    }

    /// Resolve a PF handle.
    ///
    /// Network handles are interface names and go through the interface's
    /// `device` link. Other handles already are bus addresses; their device
    /// directory has to exist.
    pub fn resolve_physical_address(&self, handle: &str, class: DeviceClass) -> Result<String> {
        if !is_interface_name(handle) {
            return Err(VioError::not_found(
                format!("PF {}", handle),
                "handle is not a device name",
            ));
        }

        if !class.is_network() {
            if !is_valid_pci_address(handle) {
                return Err(VioError::not_found(
                    format!("PF {}", handle),
                    "handle is not a PCI address",
                ));
            }
            if !self.control.exists(&self.layout.pci_device(handle)) {
                return Err(VioError::not_found(
                    format!("PF {}", handle),
                    format!("no such PCI device under {}", self.layout.root().display()),
                ));
            }
            return Ok(handle.to_string());
        }

        let link = self.layout.net_device_link(handle);
        let target = self.control.read_link(&link).map_err(|e| {
            VioError::not_found(
                format!("PCI address for network interface {}", handle),
                format!("{}: {}", link.display(), e),
            )
        })?;

        let address = link_name(&target).ok_or_else(|| {
            VioError::not_found(
                format!("PCI address for network interface {}", handle),
                format!("invalid PCI path format: {}", target.display()),
            )
        })?;

        debug!(pf = %handle, address = %address, "Resolved PF address");
        Ok(address)
    }

    /// Resolve the bus address of VF `vf_index` under `parent`.
    ///
    /// The parent's class is inferred: a handle with a `class/net` entry is a
    /// network interface, anything else is taken as a bus address.
    pub fn resolve_vf_address(&self, parent: &str, vf_index: u32) -> Result<String> {
        let class = if is_interface_name(parent)
            && self.control.exists(&self.layout.net_interface(parent))
        {
            DeviceClass::Network
        } else {
            DeviceClass::Generic
        };

        let pf_address = self.resolve_physical_address(parent, class)?;

        let link = self.layout.virtfn_link(&pf_address, vf_index);
        let target = self.control.read_link(&link).map_err(|e| {
            VioError::not_found(
                format!("VF {} for PF {}", vf_index, parent),
                format!("{}: {}", link.display(), e),
            )
        })?;

        let address = link_name(&target).ok_or_else(|| {
            VioError::not_found(
                format!("VF {} for PF {}", vf_index, parent),
                format!("invalid VF PCI path format: {}", target.display()),
            )
        })?;

        debug!(pf = %parent, vf = vf_index, address = %address, "Resolved VF address");
        Ok(address)
    }
}
