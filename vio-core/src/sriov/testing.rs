//! In-memory kernel model for engine tests.
//!
//! Interprets sysfs paths under `/sys` the way the kernel would for the
//! handful of controls the engine uses, and records every write.

use super::control::{DeviceControlPlane, SysfsLayout};
use super::network::{LinkDirective, NetworkControlPlane};
use crate::error::{Result, VioError};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub(crate) const FAKE_ROOT: &str = "/sys";

#[derive(Debug, Default)]
struct FakePf {
    numvfs: u32,
    total_vfs: u32,
    /// Driver the kernel auto-probes onto fresh VFs
    vf_driver: Option<String>,
}

#[derive(Debug)]
struct FakeDevice {
    vendor: String,
    device: String,
    driver: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    interfaces: HashMap<String, String>,
    pfs: HashMap<String, FakePf>,
    devices: HashMap<String, FakeDevice>,
    drivers: HashSet<String>,
    id_gated: HashSet<String>,
    loadable: HashSet<String>,
    new_ids: HashMap<String, Vec<String>>,
    auto_probe_on_new_id: bool,
    failing: HashSet<PathBuf>,
    failing_once: HashSet<PathBuf>,
    hidden_virtfn: HashSet<String>,
    writes: Vec<(PathBuf, String)>,
    module_loads: Vec<String>,
}

/// Fake kernel device model.
#[derive(Debug, Default)]
pub(crate) struct FakeKernel {
    state: Mutex<State>,
}

fn errno(kind: io::ErrorKind, msg: &str) -> io::Error {
    io::Error::new(kind, msg.to_string())
}

fn components(path: &Path) -> Vec<String> {
    path.strip_prefix(FAKE_ROOT)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect()
}

impl FakeKernel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layout() -> SysfsLayout {
        SysfsLayout::new(FAKE_ROOT)
    }

    /// Address the fake assigns to VF `index` of `pf`.
    pub fn vf_address(pf: &str, index: u32) -> String {
        let prefix = pf.rsplit_once(':').map(|(p, _)| p).unwrap_or(pf);
        format!("{}:{:02x}.{}", prefix, 0x10 + index / 8, index % 8)
    }

    pub fn with_pf(self, address: &str, total_vfs: u32) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.pfs.insert(address.to_string(), FakePf { total_vfs, ..Default::default() });
            state.devices.insert(
                address.to_string(),
                FakeDevice { vendor: "0x8086".into(), device: "0x1572".into(), driver: None },
            );
        }
        self
    }

    pub fn with_net_pf(self, iface: &str, address: &str, total_vfs: u32) -> Self {
        let this = self.with_pf(address, total_vfs);
        this.state.lock().unwrap().interfaces.insert(iface.to_string(), address.to_string());
        this
    }

    pub fn with_driver(self, driver: &str) -> Self {
        self.state.lock().unwrap().drivers.insert(driver.to_string());
        self
    }

    /// A driver that only binds devices whose identity was written to `new_id`.
    pub fn with_id_gated_driver(self, driver: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.drivers.insert(driver.to_string());
            state.id_gated.insert(driver.to_string());
        }
        self
    }

    /// An id-gated driver that is not registered until its module is loaded.
    pub fn with_loadable_module(self, driver: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.loadable.insert(driver.to_string());
            state.id_gated.insert(driver.to_string());
        }
        self
    }

    pub fn with_vf_driver(self, pf: &str, driver: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.drivers.insert(driver.to_string());
            if let Some(pf) = state.pfs.get_mut(pf) {
                pf.vf_driver = Some(driver.to_string());
            }
        }
        self
    }

    /// Make the id-gated driver claim matching devices as soon as their id is registered.
    pub fn with_auto_probe(self) -> Self {
        self.state.lock().unwrap().auto_probe_on_new_id = true;
        self
    }

    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().failing.insert(path.into());
    }

    /// Fail only the next write to `path`.
    pub fn fail_next_write_to(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().failing_once.insert(path.into());
    }

    /// Drop the `virtfnN` link of a VF while keeping the device itself.
    pub fn hide_virtfn(&self, vf_address: &str) {
        self.state.lock().unwrap().hidden_virtfn.insert(vf_address.to_string());
    }

    pub fn bind_externally(&self, address: &str, driver: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(dev) = state.devices.get_mut(address) {
            dev.driver = Some(driver.to_string());
        }
    }

    pub fn driver_of(&self, address: &str) -> Option<String> {
        self.state.lock().unwrap().devices.get(address).and_then(|d| d.driver.clone())
    }

    pub fn numvfs(&self, pf: &str) -> u32 {
        self.state.lock().unwrap().pfs.get(pf).map(|p| p.numvfs).unwrap_or(0)
    }

    pub fn writes(&self) -> Vec<(PathBuf, String)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn writes_to(&self, path: &Path) -> Vec<String> {
        self.writes().into_iter().filter(|(p, _)| p == path).map(|(_, v)| v).collect()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    pub fn module_loads(&self) -> Vec<String> {
        self.state.lock().unwrap().module_loads.clone()
    }

    /// Bound drivers of every device, for before/after comparisons.
    pub fn bindings(&self) -> Vec<(String, Option<String>)> {
        let state = self.state.lock().unwrap();
        let mut all: Vec<_> =
            state.devices.iter().map(|(addr, d)| (addr.clone(), d.driver.clone())).collect();
        all.sort();
        all
    }
}

impl State {
    fn set_numvfs(&mut self, pf: &str, value: &str) -> io::Result<()> {
        let count: u32 =
            value.trim().parse().map_err(|_| errno(io::ErrorKind::InvalidInput, "EINVAL"))?;
        let current = self.pfs.get(pf).ok_or_else(|| errno(io::ErrorKind::NotFound, "ENOENT"))?;
        if count > current.total_vfs {
            return Err(errno(io::ErrorKind::InvalidInput, "ERANGE"));
        }
        if count > 0 && current.numvfs > 0 && count != current.numvfs {
            return Err(errno(io::ErrorKind::Other, "EBUSY"));
        }
        let previous = current.numvfs;
        let vf_driver = current.vf_driver.clone();
        for i in 0..previous {
            self.devices.remove(&FakeKernel::vf_address(pf, i));
        }
        for i in 0..count {
            self.devices.insert(
                FakeKernel::vf_address(pf, i),
                FakeDevice { vendor: "0x8086".into(), device: "0x154c".into(), driver: vf_driver.clone() },
            );
        }
        if let Some(pf) = self.pfs.get_mut(pf) {
            pf.numvfs = count;
        }
        Ok(())
    }

    fn bind(&mut self, driver: &str, address: &str) -> io::Result<()> {
        if !self.drivers.contains(driver) {
            return Err(errno(io::ErrorKind::NotFound, "ENOENT"));
        }
        let gated = self.id_gated.contains(driver);
        let registered = self.new_ids.get(driver).cloned().unwrap_or_default();
        let dev = self.devices.get_mut(address).ok_or_else(|| errno(io::ErrorKind::NotFound, "ENODEV"))?;
        if dev.driver.is_some() {
            return Err(errno(io::ErrorKind::Other, "EBUSY"));
        }
        let identity = format!("{} {}", dev.vendor.trim_start_matches("0x"), dev.device.trim_start_matches("0x"));
        if gated && !registered.contains(&identity) {
            return Err(errno(io::ErrorKind::NotFound, "ENODEV"));
        }
        dev.driver = Some(driver.to_string());
        Ok(())
    }

    fn unbind(&mut self, driver: &str, address: &str) -> io::Result<()> {
        match self.devices.get_mut(address) {
            Some(dev) if dev.driver.as_deref() == Some(driver) => {
                dev.driver = None;
                Ok(())
            }
            _ => Err(errno(io::ErrorKind::NotFound, "ENODEV")),
        }
    }

    fn register_id(&mut self, driver: &str, identity: &str) -> io::Result<()> {
        let ids = self.new_ids.entry(driver.to_string()).or_default();
        if ids.iter().any(|i| i == identity) {
            return Err(errno(io::ErrorKind::AlreadyExists, "EEXIST"));
        }
        ids.push(identity.to_string());
        if self.auto_probe_on_new_id {
            for dev in self.devices.values_mut() {
                let id = format!(
                    "{} {}",
                    dev.vendor.trim_start_matches("0x"),
                    dev.device.trim_start_matches("0x")
                );
                if dev.driver.is_none() && id == identity {
                    dev.driver = Some(driver.to_string());
                }
            }
        }
        Ok(())
    }
}

impl DeviceControlPlane for FakeKernel {
    fn read_attr(&self, path: &Path) -> io::Result<String> {
        let state = self.state.lock().unwrap();
        let parts = components(path);
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        match parts.as_slice() {
            ["bus", "pci", "devices", addr, "sriov_numvfs"] => state
                .pfs
                .get(*addr)
                .map(|pf| pf.numvfs.to_string())
                .ok_or_else(|| errno(io::ErrorKind::NotFound, "ENOENT")),
            ["bus", "pci", "devices", addr, "vendor"] => state
                .devices
                .get(*addr)
                .map(|d| d.vendor.clone())
                .ok_or_else(|| errno(io::ErrorKind::NotFound, "ENOENT")),
            ["bus", "pci", "devices", addr, "device"] => state
                .devices
                .get(*addr)
                .map(|d| d.device.clone())
                .ok_or_else(|| errno(io::ErrorKind::NotFound, "ENOENT")),
            _ => Err(errno(io::ErrorKind::NotFound, "ENOENT")),
        }
    }

    fn write_attr(&self, path: &Path, value: &str) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.writes.push((path.to_path_buf(), value.to_string()));
        if state.failing.contains(path) || state.failing_once.remove(path) {
            return Err(errno(io::ErrorKind::PermissionDenied, "EACCES"));
        }
        let parts = components(path);
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        match parts.as_slice() {
            ["bus", "pci", "devices", addr, "sriov_numvfs"] => state.set_numvfs(addr, value),
            ["bus", "pci", "drivers", drv, "bind"] if state.drivers.contains(*drv) => {
                state.bind(drv, value)
            }
            ["bus", "pci", "drivers", drv, "unbind"] if state.drivers.contains(*drv) => {
                state.unbind(drv, value)
            }
            ["bus", "pci", "drivers", drv, "new_id"] if state.drivers.contains(*drv) => {
                state.register_id(drv, value)
            }
            _ => Err(errno(io::ErrorKind::NotFound, "ENOENT")),
        }
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        let state = self.state.lock().unwrap();
        let parts = components(path);
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        let missing = || errno(io::ErrorKind::NotFound, "ENOENT");
        match parts.as_slice() {
            ["class", "net", iface, "device"] => state
                .interfaces
                .get(*iface)
                .map(|addr| PathBuf::from(format!("../../../{}", addr)))
                .ok_or_else(missing),
            ["bus", "pci", "devices", addr, "driver"] => state
                .devices
                .get(*addr)
                .and_then(|d| d.driver.clone())
                .map(|drv| PathBuf::from(format!("../../../bus/pci/drivers/{}", drv)))
                .ok_or_else(missing),
            ["bus", "pci", "devices", addr, link] if link.starts_with("virtfn") => {
                let index: u32 = link["virtfn".len()..].parse().map_err(|_| missing())?;
                let pf = state.pfs.get(*addr).ok_or_else(missing)?;
                let vf = FakeKernel::vf_address(addr, index);
                if index < pf.numvfs && !state.hidden_virtfn.contains(&vf) {
                    Ok(PathBuf::from(format!("../{}", vf)))
                } else {
                    Err(missing())
                }
            }
            _ => Err(missing()),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.state.lock().unwrap();
        let parts = components(path);
        let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
        match parts.as_slice() {
            ["class", "net", iface] => state.interfaces.contains_key(*iface),
            ["bus", "pci", "devices", addr] => state.devices.contains_key(*addr),
            ["bus", "pci", "drivers", drv] => state.drivers.contains(*drv),
            _ => false,
        }
    }

    fn load_module(&self, module: &str) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.module_loads.push(module.to_string());
        if state.loadable.contains(module) {
            state.drivers.insert(module.to_string());
            Ok(())
        } else {
            Err(errno(io::ErrorKind::NotFound, "modprobe: module not found"))
        }
    }
}

/// Network control plane that records directives and fails on request.
#[derive(Debug, Default)]
pub(crate) struct RecordingNetwork {
    directives: Mutex<Vec<LinkDirective>>,
    failing_vfs: Mutex<HashSet<u32>>,
}

impl RecordingNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_vf(&self, vf: u32) {
        self.failing_vfs.lock().unwrap().insert(vf);
    }

    pub fn directives(&self) -> Vec<LinkDirective> {
        self.directives.lock().unwrap().clone()
    }
}

impl NetworkControlPlane for RecordingNetwork {
    fn apply(&self, directive: &LinkDirective) -> Result<()> {
        self.directives.lock().unwrap().push(directive.clone());
        match directive.vf_index() {
            Some(vf) if self.failing_vfs.lock().unwrap().contains(&vf) => {
                Err(VioError::CommandFailed {
                    command: directive.command_line(),
                    reason: "RTNETLINK answers: Operation not permitted".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}
