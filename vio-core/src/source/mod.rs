//! Descriptor sources.
//!
//! A source yields the complete desired state for one apply pass.

mod parser;


pub use parser::DescriptorParser;

use crate::error::{Result, VioError};
use crate::types::PhysicalFunctionDescriptor;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Extension of descriptor files.
pub const DESCRIPTOR_EXTENSION: &str = "conf";

/// Supplies the desired-state snapshot for a pass.
pub trait ConfigSource: Send + Sync {
    /// Load every descriptor, in apply order.
    fn load(&self) -> Result<Vec<PhysicalFunctionDescriptor>>;
}

/// Whether `path` names a descriptor file.
pub fn is_descriptor_path(path: &Path) -> bool {
    path.extension().map(|ext| ext == DESCRIPTOR_EXTENSION).unwrap_or(false)
}

/// Descriptors from `*.conf` files in a directory, applied in file-name order.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn descriptor_files(&self) -> Result<Vec<PathBuf>> {
        let io_err = |e: std::io::Error| VioError::IoError { path: self.dir.clone(), source: e };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let path = entry.path();
            // Regular files only; symlinks are followed
            if !is_descriptor_path(&path) || !path.is_file() {
                continue;
            }
            files.push(path);
        }
        files.sort();
        Ok(files)
    }
}

impl ConfigSource for DirectorySource {
    fn load(&self) -> Result<Vec<PhysicalFunctionDescriptor>> {
        let files = self.descriptor_files()?;

        let mut descriptors = Vec::with_capacity(files.len());
        for path in &files {
            match DescriptorParser::parse_file(path) {
                Ok(pf) => descriptors.push(pf),
                Err(e) => warn!(
                    operation = "load",
                    path = %path.display(),
                    error = %e,
                    "Skipping invalid descriptor"
                ),
            }
        }

        info!(
            dir = %self.dir.display(),
            files = files.len(),
            loaded = descriptors.len(),
            "Loaded descriptors"
        );
        Ok(descriptors)
    }
}
