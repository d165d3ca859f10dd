//! SR-IOV virtual function provisioning for Linux.
//!
//! This module turns a physical function descriptor into kernel state: the VF
//! count, each VF's network identity, and the driver each VF is bound to.
//! All device state lives in the kernel and is re-read on every operation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SR-IOV Provisioning                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ApplyRunner                                                │
//! │  └── apply_all() - Provision every descriptor in order      │
//! │                                                             │
//! │  VfProvisioner                                              │
//! │  ├── provision() - Disable, create, configure each VF       │
//! │  ├── NetworkIdentitySetter - MAC, VLAN, promiscuous mode    │
//! │  └── DriverBinder - Unbind, load, register, bind            │
//! │                                                             │
//! │  AddressResolver                                            │
//! │  └── Interface name / bus address -> PF and VF addresses    │
//! │                                                             │
//! │  DeviceControlPlane / NetworkControlPlane                   │
//! │  └── sysfs attribute I/O, module loading, `ip link`         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Settling
//!
//! The kernel applies VF creation and driver changes asynchronously. Instead
//! of sleeping a fixed time after each write, the engine polls the expected
//! post-condition under the timeouts in [`SettlePolicy`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use vio_core::sriov::{ApplyRunner, IpLinkControl, SysfsControlPlane, SysfsLayout, VfProvisioner};
//!
//! let provisioner = VfProvisioner::new(
//!     Arc::new(SysfsControlPlane::new()),
//!     Arc::new(IpLinkControl::new()),
//!     SysfsLayout::new("/sys"),
//!     DriverCatalog::builtin(),
//!     SettlePolicy::default(),
//! );
//! let report = ApplyRunner::new(provisioner).apply_all(&descriptors);
//! ```

mod address;
mod control;
mod driver;
mod network;
mod provisioner;
mod runner;
mod settle;

#[cfg(test)]
pub(crate) mod testing;

pub use address::{is_valid_pci_address, AddressResolver};
pub use control::{link_name, DeviceControlPlane, SysfsControlPlane, SysfsLayout};
pub use driver::{BindOutcome, DriverBindState, DriverBinder};
pub use network::{IpLinkControl, LinkDirective, NetworkControlPlane, NetworkIdentitySetter};
pub use provisioner::{ProvisionSummary, VfProvisioner};
pub use runner::{ApplyReport, ApplyRunner, DescriptorOutcome};
pub use settle::SettlePolicy;
