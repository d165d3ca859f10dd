//! vio Core Library
//!
//! SR-IOV virtual function provisioning: descriptor loading, VF creation,
//! network identity and driver rebinding.

pub mod config;
pub mod error;
pub mod observability;
pub mod paths;
pub mod source;
pub mod sriov;
pub mod types;

// Re-export commonly used items
pub use config::Settings;
pub use error::{Result, VioError};
pub use observability::init as init_observability;
pub use source::{ConfigSource, DescriptorParser, DirectorySource};
pub use sriov::{ApplyReport, ApplyRunner, SettlePolicy, VfProvisioner};
pub use types::{DeviceClass, DriverCatalog, DriverProfile, PhysicalFunctionDescriptor, VfDescriptor};
