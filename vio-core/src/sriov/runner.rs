//! Batch application of descriptors.

use crate::sriov::provisioner::{ProvisionSummary, VfProvisioner};
use crate::types::PhysicalFunctionDescriptor;
use tracing::{info, instrument, warn};

/// Outcome of one descriptor in a pass.
#[derive(Debug, Clone)]
pub struct DescriptorOutcome {
    /// Descriptor source (file path, or handle when not file-backed)
    pub source: String,
    pub handle: String,
    pub result: std::result::Result<ProvisionSummary, String>,
}

/// Report of one apply pass.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub outcomes: Vec<DescriptorOutcome>,
}

impl ApplyReport {
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    /// Descriptors whose PF could not be provisioned.
    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    /// Recoverable failures summed over all provisioned PFs.
    pub fn warning_count(&self) -> usize {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok()).map(|s| s.warnings).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }
}

/// Applies a descriptor set, one PF after another.
#[derive(Clone)]
pub struct ApplyRunner {
    provisioner: VfProvisioner,
}

impl ApplyRunner {
    pub fn new(provisioner: VfProvisioner) -> Self {
        Self { provisioner }
    }

    /// Provision every descriptor. A failing descriptor is logged and the
    /// pass moves on; nothing is rolled back.
    #[instrument(skip_all, fields(descriptors = descriptors.len()))]
    pub fn apply_all(&self, descriptors: &[PhysicalFunctionDescriptor]) -> ApplyReport {
        info!("Applying {} configuration(s)", descriptors.len());
        let mut report = ApplyReport::default();

        for pf in descriptors {
            let result = self.provisioner.provision(pf).map_err(|e| {
                warn!(
                    operation = "provision",
                    source = %pf.source_name(),
                    pf = %pf.handle,
                    error = %e,
                    "Failed to apply configuration"
                );
                e.to_string()
            });
            report.outcomes.push(DescriptorOutcome {
                source: pf.source_name(),
                handle: pf.handle.clone(),
                result,
            });
        }

        info!(
            attempted = report.attempted(),
            failed = report.failure_count(),
            warnings = report.warning_count(),
            "Apply pass finished"
        );
        report
    }
}
