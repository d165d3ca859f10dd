//! End-to-end apply against a sysfs-shaped directory tree.
//!
//! The tree is static: nothing reacts to writes the way the kernel would, so
//! these tests check what the engine writes and where, not kernel effects.

use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use vio_core::sriov::{
    ApplyRunner, LinkDirective, NetworkControlPlane, SettlePolicy, SysfsControlPlane, SysfsLayout,
    VfProvisioner,
};
use vio_core::{ConfigSource, DirectorySource, DriverCatalog, Result};

const PF: &str = "0000:05:00.0";
const VF0: &str = "0000:05:10.0";
const VF1: &str = "0000:05:10.1";

#[derive(Default)]
struct RecordingNetwork {
    directives: Mutex<Vec<LinkDirective>>,
}

impl NetworkControlPlane for RecordingNetwork {
    fn apply(&self, directive: &LinkDirective) -> Result<()> {
        self.directives.lock().unwrap().push(directive.clone());
        Ok(())
    }
}

struct SysfsTree {
    dir: TempDir,
}

impl SysfsTree {
    /// eth0 backed by PF with two VFs already present; VF1 sits on vfio-pci.
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let tree = Self { dir };

        tree.device(PF, "0x1572");
        tree.file(&format!("bus/pci/devices/{}/sriov_numvfs", PF), "0\n");
        for (i, vf) in [VF0, VF1].iter().enumerate() {
            tree.device(vf, "0x154c");
            symlink(format!("../{}", vf), tree.path(&format!("bus/pci/devices/{}/virtfn{}", PF, i)))
                .unwrap();
        }

        for control in ["bind", "unbind", "new_id"] {
            tree.file(&format!("bus/pci/drivers/vfio-pci/{}", control), "");
        }
        symlink("../../drivers/vfio-pci", tree.path(&format!("bus/pci/devices/{}/driver", VF1)))
            .unwrap();

        std::fs::create_dir_all(tree.path("class/net/eth0")).unwrap();
        symlink(format!("../../../bus/pci/devices/{}", PF), tree.path("class/net/eth0/device"))
            .unwrap();
        tree
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn file(&self, rel: &str, content: &str) {
        let path = self.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn device(&self, address: &str, device_id: &str) {
        self.file(&format!("bus/pci/devices/{}/vendor", address), "0x8086\n");
        self.file(&format!("bus/pci/devices/{}/device", address), &format!("{}\n", device_id));
    }

    fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.path(rel)).unwrap()
    }

    fn runner(&self, network: Arc<RecordingNetwork>) -> ApplyRunner {
        ApplyRunner::new(VfProvisioner::new(
            Arc::new(SysfsControlPlane::new()),
            network,
            SysfsLayout::new(self.dir.path()),
            DriverCatalog::builtin(),
            SettlePolicy::immediate(),
        ))
    }
}

fn write_descriptor(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

#[test]
fn test_apply_from_directory() {
    let tree = SysfsTree::new();
    let conf_dir = TempDir::new().unwrap();
    write_descriptor(
        conf_dir.path(),
        "10-eth0.conf",
        r#"
[pf]
name = eth0
kind = net
vfs = 2

[vf0]
driver = vfio-pci
mac = 52:54:00:12:34:56

[vf1]
driver = vfio-pci
"#,
    );

    let descriptors = DirectorySource::new(conf_dir.path()).load().unwrap();
    let network = Arc::new(RecordingNetwork::default());
    let report = tree.runner(network.clone()).apply_all(&descriptors);

    assert_eq!(report.attempted(), 1);
    assert_eq!(report.failure_count(), 0);
    let summary = report.outcomes[0].result.as_ref().unwrap();
    assert_eq!(summary.address, PF);
    assert_eq!(summary.vf_count, 2);
    // Nothing acts on the bind write, so VF0 stays unconfirmed
    assert_eq!(summary.warnings, 1);

    assert_eq!(tree.read(&format!("bus/pci/devices/{}/sriov_numvfs", PF)), "2\n");
    assert_eq!(tree.read("bus/pci/drivers/vfio-pci/new_id"), "8086 154c");
    // VF1 is already on vfio-pci and is left alone
    assert_eq!(tree.read("bus/pci/drivers/vfio-pci/bind"), VF0);
    assert_eq!(tree.read("bus/pci/drivers/vfio-pci/unbind"), "");

    assert_eq!(
        network.directives.lock().unwrap().clone(),
        vec![LinkDirective::VfMac {
            interface: "eth0".to_string(),
            vf: 0,
            mac: "52:54:00:12:34:56".to_string(),
        }]
    );
}

#[test]
fn test_unknown_pf_does_not_block_others() {
    let tree = SysfsTree::new();
    let conf_dir = TempDir::new().unwrap();
    write_descriptor(conf_dir.path(), "10-missing.conf", "[pf]\nname = eth9\nkind = net\nvfs = 2\n");
    write_descriptor(conf_dir.path(), "20-eth0.conf", "[pf]\nname = eth0\nkind = net\nvfs = 1\n");
    write_descriptor(conf_dir.path(), "30-broken.conf", "[pf]\nkind = net\n");

    let descriptors = DirectorySource::new(conf_dir.path()).load().unwrap();
    assert_eq!(descriptors.len(), 2);

    let report = tree.runner(Arc::new(RecordingNetwork::default())).apply_all(&descriptors);

    assert_eq!(report.attempted(), 2);
    assert_eq!(report.failure_count(), 1);
    assert!(report.outcomes[0].result.is_err());
    assert_eq!(report.outcomes[1].result.as_ref().unwrap().warnings, 0);
    assert_eq!(tree.read(&format!("bus/pci/devices/{}/sriov_numvfs", PF)), "1\n");
}

#[test]
fn test_missing_count_control_fails_pf() {
    let tree = SysfsTree::new();
    std::fs::remove_file(tree.path(&format!("bus/pci/devices/{}/sriov_numvfs", PF))).unwrap();

    let descriptors = vec![vio_core::PhysicalFunctionDescriptor::new(
        "eth0",
        vio_core::DeviceClass::Network,
        2,
    )];
    let report = tree.runner(Arc::new(RecordingNetwork::default())).apply_all(&descriptors);

    assert_eq!(report.failure_count(), 1);
    // The control is opened without O_CREAT
    assert!(!tree.path(&format!("bus/pci/devices/{}/sriov_numvfs", PF)).exists());
}
