//! Descriptor file parser.
//!
//! A descriptor is a small INI-style file: a `[pf]` section naming the
//! physical function and one `[vfN]` section per configured VF.

use crate::error::{Result, VioError};
use crate::sriov::is_valid_pci_address;
use crate::types::{
    is_valid_driver_name, DeviceClass, PhysicalFunctionDescriptor, VfDescriptor, MAX_VFS,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, instrument, warn};

/// Colon-separated 48-bit MAC address.
static MAC_ADDRESS_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{2}(:[0-9a-fA-F]{2}){5}$").expect("Invalid MAC address regex")
});

/// Highest 802.1Q VLAN ID.
const MAX_VLAN: u16 = 4095;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Pf,
    Vf(u32),
    Unknown,
}

/// Parser for `*.conf` descriptor files.
pub struct DescriptorParser;

impl DescriptorParser {
    /// Parse descriptor `content`; `path` is recorded as the source and used in errors.
    ///
    /// # Errors
    ///
    /// Returns [`VioError::DescriptorParse`] if:
    /// - The `[pf]` section has no `name`
    /// - `vfs` is not a number or exceeds the VF slot limit
    /// - A `[vfN]` section is out of range for `vfs`
    /// - A MAC, VLAN or driver value is malformed
    /// - A non-network handle is not a bus address
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn parse(content: &str, path: &Path) -> Result<PhysicalFunctionDescriptor> {
        let err = |line: usize, reason: String| VioError::DescriptorParse {
            path: path.to_path_buf(),
            line,
            reason,
        };

        let mut section = Section::Pf;
        let mut name: Option<String> = None;
        let mut class = DeviceClass::Generic;
        let mut vf_count: u32 = 0;
        let mut promiscuous = false;
        // index -> (header line, descriptor)
        let mut vfs: BTreeMap<u32, (usize, VfDescriptor)> = BTreeMap::new();

        for (i, raw) in content.lines().enumerate() {
            let lineno = i + 1;
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = Self::parse_section(header.trim(), lineno, &err)?;
                if let Section::Vf(index) = section {
                    vfs.entry(index).or_insert_with(|| (lineno, VfDescriptor::at(index)));
                }
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                warn!(line = lineno, "Ignoring line without '='");
                continue;
            };
            let (key, value) = (key.trim(), value.trim());

            match section {
                Section::Pf => match key {
                    "name" => name = Some(value.to_string()),
                    "kind" => {
                        class = value.parse().unwrap_or_else(|e: String| {
                            warn!(line = lineno, error = %e, "Treating device as generic");
                            DeviceClass::Generic
                        })
                    }
                    "vfs" => {
                        vf_count = value.parse().map_err(|_| {
                            err(lineno, format!("vfs must be a number, got {:?}", value))
                        })?;
                        if vf_count as usize > MAX_VFS {
                            return Err(err(
                                lineno,
                                format!("vfs {} exceeds the limit of {}", vf_count, MAX_VFS),
                            ));
                        }
                    }
                    "promisc" => promiscuous = parse_flag(value, lineno),
                    _ => warn!(line = lineno, key = %key, "Ignoring unknown [pf] key"),
                },
                Section::Vf(index) => {
                    let (_, vf) =
                        vfs.entry(index).or_insert_with(|| (lineno, VfDescriptor::at(index)));
                    match key {
                        "driver" if value.is_empty() => vf.driver = None,
                        "driver" => {
                            if !is_valid_driver_name(value) {
                                return Err(err(lineno, format!("invalid driver name {:?}", value)));
                            }
                            vf.driver = Some(value.to_string());
                        }
                        "mac" => {
                            if !MAC_ADDRESS_REGEX.is_match(value) {
                                return Err(err(lineno, format!("invalid MAC address {:?}", value)));
                            }
                            vf.mac = Some(value.to_lowercase());
                        }
                        "vlan" => {
                            vf.vlan = value
                                .parse::<u16>()
                                .ok()
                                .filter(|v| *v <= MAX_VLAN)
                                .ok_or_else(|| {
                                    err(
                                        lineno,
                                        format!("vlan must be 0..={}, got {:?}", MAX_VLAN, value),
                                    )
                                })?;
                        }
                        _ => warn!(line = lineno, key = %key, vf = index, "Ignoring unknown VF key"),
                    }
                }
                Section::Unknown => debug!(line = lineno, key = %key, "Skipping key in unknown section"),
            }
        }

        let handle = name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| err(0, "missing [pf] name".to_string()))?;

        if !class.is_network() && !is_valid_pci_address(&handle) {
            return Err(err(
                0,
                format!("{} device {:?} must be named by PCI address", class, handle),
            ));
        }

        let mut pf = PhysicalFunctionDescriptor::new(handle, class, vf_count);
        pf.promiscuous = promiscuous;
        pf.source = path.to_path_buf();

        for (index, (header_line, vf)) in vfs {
            if index >= vf_count {
                return Err(err(
                    header_line,
                    format!("vf{} is out of range for vfs = {}", index, vf_count),
                ));
            }
            pf = pf.with_vf(vf);
        }

        if promiscuous && !class.is_network() {
            warn!(pf = %pf.handle, "promisc only applies to network devices, ignoring");
        }

        debug!(pf = %pf.handle, class = %pf.class, vfs = pf.vf_count, "Parsed descriptor");
        Ok(pf)
    }

    /// Read and parse a descriptor file.
    pub fn parse_file(path: &Path) -> Result<PhysicalFunctionDescriptor> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| VioError::IoError { path: path.to_path_buf(), source: e })?;
        Self::parse(&content, path)
    }

    fn parse_section(
        header: &str,
        lineno: usize,
        err: &impl Fn(usize, String) -> VioError,
    ) -> Result<Section> {
        if header == "pf" {
            return Ok(Section::Pf);
        }
        if let Some(index) = header.strip_prefix("vf") {
            let index: usize = index
                .parse()
                .map_err(|_| err(lineno, format!("invalid VF section [{}]", header)))?;
            if index >= MAX_VFS {
                return Err(err(
                    lineno,
                    format!("VF index {} exceeds the limit of {}", index, MAX_VFS),
                ));
            }
            return Ok(Section::Vf(index as u32));
        }
        warn!(line = lineno, section = %header, "Ignoring unknown section");
        Ok(Section::Unknown)
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn parse_flag(value: &str, lineno: usize) -> bool {
    match value.to_lowercase().as_str() {
        "on" | "yes" | "true" | "1" => true,
        "off" | "no" | "false" | "0" => false,
        other => {
            warn!(line = lineno, value = %other, "Unrecognized flag value, treating as off");
            false
        }
    }
}
