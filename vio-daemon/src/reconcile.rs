//! One full reconciliation pass: load every descriptor, apply every descriptor.

use std::sync::Arc;
use tracing::{error, info};
use vio_core::sriov::{IpLinkControl, SysfsControlPlane, VfProvisioner};
use vio_core::{ApplyReport, ApplyRunner, ConfigSource, DirectorySource, Settings};

/// Brings the host in line with the descriptor set.
pub struct Reconciler {
    source: Arc<dyn ConfigSource>,
    runner: ApplyRunner,
}

impl Reconciler {
    pub fn new(source: Arc<dyn ConfigSource>, runner: ApplyRunner) -> Self {
        Self { source, runner }
    }

    /// Reconciler over the host's sysfs and `ip`, reading the configured directory.
    pub fn from_settings(settings: &Settings) -> Self {
        let provisioner = VfProvisioner::new(
            Arc::new(SysfsControlPlane::new()),
            Arc::new(IpLinkControl::new()),
            settings.layout(),
            settings.catalog(),
            settings.settle,
        );
        Self::new(
            Arc::new(DirectorySource::new(settings.config_dir.clone())),
            ApplyRunner::new(provisioner),
        )
    }

    /// Run a pass. Blocks for as long as the kernel takes to settle.
    ///
    /// Only a descriptor source that cannot be read at all is an error; per-PF
    /// failures end up in the report.
    pub fn reconcile(&self) -> vio_core::Result<ApplyReport> {
        info!("Reconciling SR-IOV configuration...");
        let descriptors = self.source.load().map_err(|e| {
            error!(operation = "load", error = %e, "Failed to load configurations");
            e
        })?;
        Ok(self.runner.apply_all(&descriptors))
    }

    /// Pass for the reload loop: returns the number of failed descriptors, with
    /// an unreadable source counted as one failure.
    pub fn reconcile_counting_failures(&self) -> usize {
        match self.reconcile() {
            Ok(report) => report.failure_count(),
            Err(_) => 1,
        }
    }
}
