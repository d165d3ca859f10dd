//! Per-VF network identity (MAC, VLAN) and PF promiscuous mode.
//!
//! Uses the `ip` command; each attribute is one atomic `ip link set` call.

use crate::error::{Result, VioError};
use std::process::Command;
use std::sync::Arc;
use tracing::{info, warn};

/// One directive for the host network-configuration control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkDirective {
    VfMac { interface: String, vf: u32, mac: String },
    VfVlan { interface: String, vf: u32, vlan: u16 },
    Promiscuous { interface: String },
}

impl LinkDirective {
    /// Arguments for `ip`.
    pub fn ip_args(&self) -> Vec<String> {
        match self {
            LinkDirective::VfMac { interface, vf, mac } => vec![
                "link".into(),
                "set".into(),
                interface.clone(),
                "vf".into(),
                vf.to_string(),
                "mac".into(),
                mac.clone(),
            ],
            LinkDirective::VfVlan { interface, vf, vlan } => vec![
                "link".into(),
                "set".into(),
                interface.clone(),
                "vf".into(),
                vf.to_string(),
                "vlan".into(),
                vlan.to_string(),
            ],
            LinkDirective::Promiscuous { interface } => {
                vec!["link".into(), "set".into(), interface.clone(), "promisc".into(), "on".into()]
            }
        }
    }

    /// The full command line, for log lines and errors.
    pub fn command_line(&self) -> String {
        format!("ip {}", self.ip_args().join(" "))
    }

    pub fn interface(&self) -> &str {
        match self {
            LinkDirective::VfMac { interface, .. }
            | LinkDirective::VfVlan { interface, .. }
            | LinkDirective::Promiscuous { interface } => interface,
        }
    }

    pub fn vf_index(&self) -> Option<u32> {
        match self {
            LinkDirective::VfMac { vf, .. } | LinkDirective::VfVlan { vf, .. } => Some(*vf),
            LinkDirective::Promiscuous { .. } => None,
        }
    }
}

/// Host network-configuration control plane.
pub trait NetworkControlPlane: Send + Sync {
    /// Apply one directive; a non-zero result is `CommandFailed`.
    fn apply(&self, directive: &LinkDirective) -> Result<()>;
}

/// [`NetworkControlPlane`] that shells out to `ip`.
#[derive(Debug, Clone, Default)]
pub struct IpLinkControl;

impl IpLinkControl {
    pub fn new() -> Self {
        Self
    }
}

impl NetworkControlPlane for IpLinkControl {
    fn apply(&self, directive: &LinkDirective) -> Result<()> {
        let output = Command::new("ip").args(directive.ip_args()).output().map_err(|e| {
            VioError::CommandFailed {
                command: directive.command_line(),
                reason: format!("Failed to run ip: {}", e),
            }
        })?;

        if !output.status.success() {
            return Err(VioError::CommandFailed {
                command: directive.command_line(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Applies MAC/VLAN/promiscuous attributes.
///
/// Failures are logged here and returned; callers treat them as non-terminal.
#[derive(Clone)]
pub struct NetworkIdentitySetter {
    control: Arc<dyn NetworkControlPlane>,
}

impl NetworkIdentitySetter {
    pub fn new(control: Arc<dyn NetworkControlPlane>) -> Self {
        Self { control }
    }

    pub fn set_mac(&self, interface: &str, vf: u32, mac: &str) -> Result<()> {
        let directive =
            LinkDirective::VfMac { interface: interface.to_string(), vf, mac: mac.to_string() };
        self.run(&directive)?;
        info!(pf = %interface, vf, mac = %mac, "Set VF MAC");
        Ok(())
    }

    pub fn set_vlan(&self, interface: &str, vf: u32, vlan: u16) -> Result<()> {
        let directive = LinkDirective::VfVlan { interface: interface.to_string(), vf, vlan };
        self.run(&directive)?;
        info!(pf = %interface, vf, vlan, "Set VF VLAN");
        Ok(())
    }

    pub fn set_promiscuous(&self, interface: &str) -> Result<()> {
        let directive = LinkDirective::Promiscuous { interface: interface.to_string() };
        self.run(&directive)?;
        info!(pf = %interface, "Enabled promiscuous mode");
        Ok(())
    }

    fn run(&self, directive: &LinkDirective) -> Result<()> {
        self.control.apply(directive).map_err(|e| {
            warn!(
                operation = %directive.command_line(),
                pf = %directive.interface(),
                vf = ?directive.vf_index(),
                error = %e,
                "Network control plane rejected directive"
            );
            e
        })
    }
}
