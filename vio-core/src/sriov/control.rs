//! Kernel device control plane.
//!
//! Every control the engine touches is a plain-text sysfs attribute or a
//! symbolic link. [`DeviceControlPlane`] is the seam between the engine and the
//! host; [`SysfsControlPlane`] is the real implementation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Layout of the sysfs tree under a configurable root.
#[derive(Debug, Clone)]
pub struct SysfsLayout {
    root: PathBuf,
}

impl Default for SysfsLayout {
    fn default() -> Self {
        Self::new(crate::paths::DEFAULT_SYSFS_ROOT)
    }
}

impl SysfsLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `class/net/<iface>`
    pub fn net_interface(&self, iface: &str) -> PathBuf {
        self.root.join("class/net").join(iface)
    }

    /// `class/net/<iface>/device`, the link to the backing PCI device.
    pub fn net_device_link(&self, iface: &str) -> PathBuf {
        self.net_interface(iface).join("device")
    }

    /// `bus/pci/devices/<addr>`
    pub fn pci_device(&self, address: &str) -> PathBuf {
        self.root.join("bus/pci/devices").join(address)
    }

    /// VF-count control of a PF.
    pub fn sriov_numvfs(&self, address: &str) -> PathBuf {
        self.pci_device(address).join("sriov_numvfs")
    }

    /// Parent to VF relation.
    pub fn virtfn_link(&self, address: &str, vf_index: u32) -> PathBuf {
        self.pci_device(address).join(format!("virtfn{}", vf_index))
    }

    /// Current driver relation of a device.
    pub fn driver_link(&self, address: &str) -> PathBuf {
        self.pci_device(address).join("driver")
    }

    pub fn vendor(&self, address: &str) -> PathBuf {
        self.pci_device(address).join("vendor")
    }

    pub fn device_id(&self, address: &str) -> PathBuf {
        self.pci_device(address).join("device")
    }

    /// `bus/pci/drivers/<driver>`
    pub fn driver_dir(&self, driver: &str) -> PathBuf {
        self.root.join("bus/pci/drivers").join(driver)
    }

    pub fn driver_bind(&self, driver: &str) -> PathBuf {
        self.driver_dir(driver).join("bind")
    }

    pub fn driver_unbind(&self, driver: &str) -> PathBuf {
        self.driver_dir(driver).join("unbind")
    }

    /// Identity-registration control of a driver.
    pub fn driver_new_id(&self, driver: &str) -> PathBuf {
        self.driver_dir(driver).join("new_id")
    }
}

/// Access to the kernel device model.
///
/// Implementations must not cache: every call observes current kernel state.
pub trait DeviceControlPlane: Send + Sync {
    /// Read a short text attribute, trimmed.
    fn read_attr(&self, path: &Path) -> io::Result<String>;

    /// Write a text value to a control.
    fn write_attr(&self, path: &Path, value: &str) -> io::Result<()>;

    /// Read the target of a symbolic relation.
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Whether a path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Ask the host to load a kernel module.
    fn load_module(&self, module: &str) -> io::Result<()>;
}

/// Final path segment of a link target, e.g. `0000:05:10.0` from `../0000:05:10.0`.
pub fn link_name(target: &Path) -> Option<String> {
    target
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty() && n != "..")
}

/// [`DeviceControlPlane`] backed by the real sysfs and `modprobe`.
#[derive(Debug, Clone, Default)]
pub struct SysfsControlPlane;

impl SysfsControlPlane {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceControlPlane for SysfsControlPlane {
    fn read_attr(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path).map(|s| s.trim().to_string())
    }

    fn write_attr(&self, path: &Path, value: &str) -> io::Result<()> {
        debug!(path = %path.display(), value = %value, "Writing sysfs control");
        // Controls must be opened without O_CREAT; a missing control is an error.
        let mut file = fs::OpenOptions::new().write(true).open(path)?;
        io::Write::write_all(&mut file, value.as_bytes())
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn load_module(&self, module: &str) -> io::Result<()> {
        debug!(module = %module, "Running modprobe");
        let output = Command::new("modprobe").arg(module).output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::Other,
                format!(
                    "modprobe {} exited with {}: {}",
                    module,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ))
        }
    }
}
