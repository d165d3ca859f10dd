//! Kernel driver binding for a single VF.
//!
//! # Process
//!
//! 1. Load the driver's module if its profile asks for it and it is missing
//! 2. Check the driver is registered and the device exists
//! 3. Observe the current binding; already on the target means nothing to do
//! 4. Unbind from the current driver
//! 5. Register the device's vendor/device pair if the driver needs it
//! 6. Bind to the target
//!
//! The binding is re-read from the kernel at every step. Nothing here keeps
//! a "current driver" field: another agent may rebind the device at any time.

use crate::error::{Result, VioError};
use crate::sriov::control::{link_name, DeviceControlPlane, SysfsLayout};
use crate::sriov::settle::SettlePolicy;
use crate::types::{is_valid_driver_name, DriverCatalog, DriverProfile};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Driver binding of a device as currently seen by the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverBindState {
    Unbound,
    BoundTo(String),
}

impl DriverBindState {
    pub fn is_bound_to(&self, driver: &str) -> bool {
        matches!(self, DriverBindState::BoundTo(d) if d == driver)
    }
}

/// How a successful `bind` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// Already on the target driver; nothing was written
    AlreadyBound,
    /// Bound and confirmed through the driver link
    Bound,
    /// The bind write succeeded but the driver link did not show the target in time
    Unconfirmed,
}

/// Manages the driver binding of VF devices.
#[derive(Clone)]
pub struct DriverBinder {
    control: Arc<dyn DeviceControlPlane>,
    layout: SysfsLayout,
    catalog: DriverCatalog,
    settle: SettlePolicy,
}

impl DriverBinder {
    pub fn new(
        control: Arc<dyn DeviceControlPlane>,
        layout: SysfsLayout,
        catalog: DriverCatalog,
        settle: SettlePolicy,
    ) -> Self {
        Self { control, layout, catalog, settle }
    }

    /// Read the current binding of `address` from its `driver` link.
    pub fn observe(&self, address: &str) -> DriverBindState {
        self.control
            .read_link(&self.layout.driver_link(address))
            .ok()
            .and_then(|target| link_name(&target))
            .map(DriverBindState::BoundTo)
            .unwrap_or(DriverBindState::Unbound)
    }

    /// Whether `driver` is registered with the PCI bus.
    pub fn is_driver_registered(&self, driver: &str) -> bool {
        self.control.exists(&self.layout.driver_dir(driver))
    }

    /// Bind the device at `address` to `driver`.
    #[instrument(skip_all, fields(address = %address, driver = %driver))]
    pub fn bind(&self, address: &str, driver: &str) -> Result<BindOutcome> {
        if !is_valid_driver_name(driver) {
            return Err(VioError::DriverUnavailable { driver: driver.to_string() });
        }
        let profile = self.catalog.profile(driver);

        if profile.needs_module_load && !self.is_driver_registered(driver) {
            self.load_module(&profile);
        }

        if !self.is_driver_registered(driver) {
            return Err(VioError::DriverUnavailable { driver: driver.to_string() });
        }

        if !self.control.exists(&self.layout.pci_device(address)) {
            return Err(VioError::DeviceNotFound { address: address.to_string() });
        }

        match self.observe(address) {
            DriverBindState::BoundTo(current) if current == driver => {
                info!("VF already bound to target driver");
                return Ok(BindOutcome::AlreadyBound);
            }
            DriverBindState::BoundTo(current) => self.unbind(address, &current),
            DriverBindState::Unbound => {}
        }

        if profile.needs_identity_registration && self.register_identity(address, &profile) {
            info!("Driver claimed VF after identity registration");
            return Ok(BindOutcome::Bound);
        }

        let bind_path = self.layout.driver_bind(driver);
        debug!("Binding to driver");
        if let Err(e) = self.control.write_attr(&bind_path, address) {
            // The device may have been claimed in the meantime (auto-probe after new_id)
            if self.observe(address).is_bound_to(driver) {
                debug!("VF bound to target driver despite failed bind write");
                return Ok(BindOutcome::Bound);
            }
            return Err(VioError::BindFailed {
                address: address.to_string(),
                driver: driver.to_string(),
                reason: e.to_string(),
            });
        }

        if self.settle.wait_until(self.settle.bind_ms, || self.observe(address).is_bound_to(driver))
        {
            info!("Successfully bound VF to driver");
            Ok(BindOutcome::Bound)
        } else {
            warn!("Bind write accepted but driver link does not show the target yet");
            Ok(BindOutcome::Unconfirmed)
        }
    }

    fn load_module(&self, profile: &DriverProfile) {
        let module = profile.module_name();
        info!(module = %module, "Loading kernel module");
        if let Err(e) = self.control.load_module(module) {
            // Not fatal: the registration check right after reports it properly
            warn!(module = %module, error = %e, "Module load failed");
            return;
        }
        if !self.settle.wait_until(self.settle.module_load_ms, || {
            self.is_driver_registered(&profile.name)
        }) {
            warn!(module = %module, "Module loaded but driver did not register in time");
        }
    }

    fn unbind(&self, address: &str, current: &str) {
        info!(current = %current, "Unbinding VF from current driver");
        let unbind_path = self.layout.driver_unbind(current);
        if let Err(e) = self.control.write_attr(&unbind_path, address) {
            warn!(current = %current, path = %unbind_path.display(), error = %e, "Unbind write failed");
        }
        if !self.settle.wait_until(self.settle.unbind_ms, || {
            !self.observe(address).is_bound_to(current)
        }) {
            warn!(current = %current, "VF still bound to previous driver after unbind");
        }
    }

    /// Write the device's vendor/device pair to the driver's `new_id` control.
    ///
    /// Returns true if the driver claimed the device on its own afterwards.
    fn register_identity(&self, address: &str, profile: &DriverProfile) -> bool {
        let identity = match self.read_identity(address) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Cannot read vendor/device IDs, skipping identity registration");
                return false;
            }
        };

        info!(identity = %identity, "Registering device ID with driver");
        let new_id = self.layout.driver_new_id(&profile.name);
        if let Err(e) = self.control.write_attr(&new_id, &identity) {
            // EEXIST when the pair is already registered
            debug!(identity = %identity, error = %e, "Identity registration write rejected");
        }

        self.settle.wait_until(self.settle.registration_ms, || {
            self.observe(address).is_bound_to(&profile.name)
        })
    }

    /// `"<vendor> <device>"`, lower-case hex without `0x`.
    fn read_identity(&self, address: &str) -> Result<String> {
        let read = |path: std::path::PathBuf| {
            self.control
                .read_attr(&path)
                .map(|v| v.trim().trim_start_matches("0x").to_lowercase())
                .map_err(|e| VioError::IoError { path, source: e })
        };
        let vendor = read(self.layout.vendor(address))?;
        let device = read(self.layout.device_id(address))?;
        Ok(format!("{} {}", vendor, device))
    }
}
