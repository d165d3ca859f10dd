//! Core domain types for vio.

pub mod device;
pub mod driver;

// Re-exports
pub use device::{DeviceClass, PhysicalFunctionDescriptor, VfDescriptor, MAX_VFS};
pub use driver::{is_valid_driver_name, DriverCatalog, DriverProfile, VFIO_PCI_DRIVER};
