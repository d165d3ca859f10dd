//! Provisioning of one physical function.
//!
//! Every pass starts from scratch: release all VFs, create the target count,
//! then configure each VF on its own. Only the create step can fail the PF;
//! everything after it degrades to warnings.

use crate::error::{Result, VioError};
use crate::sriov::address::AddressResolver;
use crate::sriov::control::{DeviceControlPlane, SysfsLayout};
use crate::sriov::driver::{BindOutcome, DriverBinder};
use crate::sriov::network::{NetworkControlPlane, NetworkIdentitySetter};
use crate::sriov::settle::SettlePolicy;
use crate::types::{DriverCatalog, PhysicalFunctionDescriptor, VfDescriptor};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Result of provisioning one PF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSummary {
    /// PF bus address
    pub address: String,
    /// VFs created
    pub vf_count: u32,
    /// Configured VF slots that went through per-VF configuration
    pub configured_vfs: usize,
    /// Recoverable failures logged along the way
    pub warnings: usize,
}

/// Drives VF count, network identity and driver binding for a PF.
#[derive(Clone)]
pub struct VfProvisioner {
    control: Arc<dyn DeviceControlPlane>,
    layout: SysfsLayout,
    resolver: AddressResolver,
    binder: DriverBinder,
    network: NetworkIdentitySetter,
    settle: SettlePolicy,
}

impl VfProvisioner {
    pub fn new(
        control: Arc<dyn DeviceControlPlane>,
        network: Arc<dyn NetworkControlPlane>,
        layout: SysfsLayout,
        catalog: DriverCatalog,
        settle: SettlePolicy,
    ) -> Self {
        Self {
            resolver: AddressResolver::new(control.clone(), layout.clone()),
            binder: DriverBinder::new(control.clone(), layout.clone(), catalog, settle),
            network: NetworkIdentitySetter::new(network),
            control,
            layout,
            settle,
        }
    }

    /// Bring `pf` to the state its descriptor asks for.
    #[instrument(skip_all, fields(pf = %pf.handle, class = %pf.class))]
    pub fn provision(&self, pf: &PhysicalFunctionDescriptor) -> Result<ProvisionSummary> {
        info!(vfs = pf.vf_count, "Creating VFs");
        let mut warnings = 0;

        let address = self.resolver.resolve_physical_address(&pf.handle, pf.class)?;
        let numvfs = self.layout.sriov_numvfs(&address);

        // Release existing VFs; the kernel rejects changing a non-zero count directly
        match self.control.write_attr(&numvfs, "0") {
            Ok(()) => {
                if !self.settle.wait_until(self.settle.vf_teardown_ms, || {
                    self.read_vf_count(&address) == Some(0)
                }) {
                    warn!(address = %address, "VF count did not read back 0 after disabling");
                    warnings += 1;
                }
            }
            Err(e) => {
                warn!(address = %address, error = %e, "Failed to disable existing VFs");
                warnings += 1;
            }
        }

        let target = pf.vf_count.to_string();
        self.control.write_attr(&numvfs, &target).map_err(|e| {
            warn!(address = %address, error = %e, "Failed to create VFs");
            VioError::WriteFailed { path: numvfs.clone(), value: target.clone(), source: e }
        })?;

        if !self.settle.wait_until(self.settle.vf_creation_ms, || {
            self.read_vf_count(&address) == Some(pf.vf_count)
        }) {
            warn!(address = %address, vfs = pf.vf_count, "VF count did not read back the target");
            warnings += 1;
        }

        let (plan, skipped) = plan_slots(pf);
        warnings += skipped;
        for (index, vf) in &plan {
            warnings += self.configure_vf(pf, *index, vf);
        }

        if pf.class.is_network() && pf.promiscuous && self.network.set_promiscuous(&pf.handle).is_err()
        {
            warn!("Failed to enable promiscuous mode");
            warnings += 1;
        }

        info!(address = %address, vfs = pf.vf_count, warnings, "Created and configured VFs");
        Ok(ProvisionSummary { address, vf_count: pf.vf_count, configured_vfs: plan.len(), warnings })
    }

    fn read_vf_count(&self, address: &str) -> Option<u32> {
        self.control.read_attr(&self.layout.sriov_numvfs(address)).ok()?.trim().parse().ok()
    }

    /// Apply one VF's attributes. Returns the number of failures.
    fn configure_vf(&self, pf: &PhysicalFunctionDescriptor, index: u32, vf: &VfDescriptor) -> usize {
        info!(vf = index, "Configuring VF");
        let mut failures = 0;

        if pf.class.is_network() {
            if let Some(mac) = &vf.mac {
                if self.network.set_mac(&pf.handle, index, mac).is_err() {
                    warn!(vf = index, mac = %mac, "Failed to set MAC for VF");
                    failures += 1;
                }
            }
            if vf.vlan > 0 && self.network.set_vlan(&pf.handle, index, vf.vlan).is_err() {
                warn!(vf = index, vlan = vf.vlan, "Failed to set VLAN for VF");
                failures += 1;
            }
        }

        if let Some(driver) = &vf.driver {
            match self.resolver.resolve_vf_address(&pf.handle, index) {
                Ok(address) => match self.binder.bind(&address, driver) {
                    Ok(BindOutcome::Unconfirmed) => failures += 1,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(vf = index, address = %address, driver = %driver, error = %e, "Failed to bind driver for VF");
                        failures += 1;
                    }
                },
                Err(e) => {
                    warn!(vf = index, error = %e, "Cannot get PCI address for VF, skipping driver binding");
                    failures += 1;
                }
            }
        }

        failures
    }
}

/// Pair every configured slot in `0..vf_count` with its resolved index.
///
/// Unconfigured slots are left out before indices are compared, so they never
/// shadow a configured VF. Indices outside `[0, vf_count)` and repeats of an
/// earlier index are dropped with a warning and counted in the second value;
/// descriptors past the last slot are ignored.
fn plan_slots(pf: &PhysicalFunctionDescriptor) -> (Vec<(u32, VfDescriptor)>, usize) {
    let mut seen = HashSet::new();
    let mut plan = Vec::with_capacity(pf.vf_count as usize);
    let mut skipped = 0;

    for slot in 0..pf.vf_count as usize {
        let vf = pf.vf_at(slot);
        if vf.is_empty() {
            continue;
        }
        let index = vf.resolved_index(slot);
        if index >= pf.vf_count {
            warn!(slot, vf = index, vfs = pf.vf_count, "VF index out of range, skipping");
            skipped += 1;
            continue;
        }
        if !seen.insert(index) {
            warn!(slot, vf = index, "Duplicate VF index, skipping");
            skipped += 1;
            continue;
        }
        plan.push((index, vf));
    }

    let extra = pf.vfs.iter().skip(pf.vf_count as usize).filter(|vf| !vf.is_empty()).count();
    if extra > 0 {
        warn!(extra, vfs = pf.vf_count, "Ignoring VF descriptors beyond the VF count");
    }

    (plan, skipped)
}
