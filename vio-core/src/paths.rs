//! Centralized path configuration for vio.
//!
//! All host paths go through this module so the daemon and tests agree on
//! where descriptors, settings, and the kernel device model live.

use std::path::PathBuf;

/// Default descriptor directory.
pub const DEFAULT_CONFIG_DIR: &str = "/etc/vio.d";

/// Default daemon settings file.
pub const DEFAULT_SETTINGS_PATH: &str = "/etc/vio/viod.json";

/// Default sysfs mount point.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys";

/// Get the descriptor directory.
///
/// Resolution order:
/// 1. `VIO_CONFIG_DIR` environment variable
/// 2. `/etc/vio.d`
pub fn config_dir() -> PathBuf {
    std::env::var("VIO_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_DIR))
}

/// Get the daemon settings path (`VIO_SETTINGS` overrides).
pub fn settings_path() -> PathBuf {
    std::env::var("VIO_SETTINGS")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_PATH))
}

/// Get the sysfs root (`VIO_SYSFS_ROOT` overrides, used by staging hosts and tests).
pub fn sysfs_root() -> PathBuf {
    std::env::var("VIO_SYSFS_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SYSFS_ROOT))
}
