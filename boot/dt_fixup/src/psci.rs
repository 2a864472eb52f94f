//! Description of the PSCI power management interface
//!
//! The runtime firmware implements the [Power State Coordination Interface](https://developer.arm.com/documentation/den0022/latest).
//! These fixups advertise it to the operating system through a `/psci` node and make every cpu use it for bring-up.

use crate::{Fixup, FixupError, PsciConvention, Stage};
use device_tree::tree::{DeviceTree, EditError};

/// Compatible strings of the `/psci` node, most specific first
const PSCI_COMPATIBLE: [&str; 3] = ["arm,psci-1.0", "arm,psci-0.2", "arm,psci"];

/// PSCI function ids advertised in the device tree
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FunctionIds {
    pub cpu_suspend: u32,
    pub cpu_off: u32,
    pub cpu_on: u32,
    pub sys_poweroff: u32,
    pub sys_reset: u32,
}

impl FunctionIds {
    pub const SMC64: Self = Self {
        cpu_suspend: 0xc400_0001,
        cpu_off: 0x8400_0002,
        cpu_on: 0xc400_0003,
        sys_poweroff: 0x8400_0008,
        sys_reset: 0x8400_0009,
    };

    pub const SMC32: Self = Self {
        cpu_suspend: 0x8400_0001,
        cpu_off: 0x8400_0002,
        cpu_on: 0x8400_0003,
        sys_poweroff: 0x8400_0008,
        sys_reset: 0x8400_0009,
    };

    pub const fn for_convention(convention: PsciConvention) -> Self {
        match convention {
            PsciConvention::Smc64 => Self::SMC64,
            PsciConvention::Smc32 => Self::SMC32,
        }
    }
}

/// Adds the `/psci` node unless the device tree already has one
#[derive(Debug, Copy, Clone)]
pub struct PsciNode {
    pub convention: PsciConvention,
}

impl PsciNode {
    fn add_node(&self, tree: &mut DeviceTree) -> Result<(), EditError> {
        let ids = FunctionIds::for_convention(self.convention);
        let root = tree.root();
        let psci = tree.add_child(root, "psci")?;
        for compatible in PSCI_COMPATIBLE {
            tree.append_property_string(psci, "compatible", compatible)?;
        }
        tree.set_property_string(psci, "method", "smc")?;
        tree.set_property_u32(psci, "cpu_suspend", ids.cpu_suspend)?;
        tree.set_property_u32(psci, "cpu_off", ids.cpu_off)?;
        tree.set_property_u32(psci, "cpu_on", ids.cpu_on)?;
        tree.set_property_u32(psci, "sys_poweroff", ids.sys_poweroff)?;
        tree.set_property_u32(psci, "sys_reset", ids.sys_reset)?;
        Ok(())
    }
}

impl Fixup for PsciNode {
    fn name(&self) -> &'static str {
        "psci"
    }

    fn stage(&self) -> Stage {
        Stage::PmDescriptorAdded
    }

    fn apply(&self, tree: &mut DeviceTree) -> Result<(), FixupError> {
        if tree.find_node_by_path("/psci").is_some() {
            log::warn!("PSCI Device Tree node already exists!");
            return Ok(());
        }
        self.add_node(tree)
            .map_err(FixupError::PowerManagementFailed)
    }
}

/// Sets `enable-method = "psci"` on every cpu node below `/cpus`
#[derive(Debug, Default, Copy, Clone)]
pub struct PsciCpuEnableMethods;

impl Fixup for PsciCpuEnableMethods {
    fn name(&self) -> &'static str {
        "cpu-enable"
    }

    fn stage(&self) -> Stage {
        Stage::CpuEnableMethodsAdded
    }

    fn apply(&self, tree: &mut DeviceTree) -> Result<(), FixupError> {
        let cpus = tree
            .find_node_by_path("/cpus")
            .ok_or(FixupError::MissingDependency("a /cpus node"))?;
        let children = tree
            .children(cpus)
            .map_err(FixupError::CpuEnableMethodsFailed)?
            .to_vec();

        for cpu in children {
            let is_cpu = tree
                .get_property(cpu, "device_type")
                .and_then(|p| p.as_str())
                .is_some_and(|t| t == "cpu");
            if !is_cpu {
                continue;
            }
            tree.set_property_string(cpu, "enable-method", "psci")
                .map_err(FixupError::CpuEnableMethodsFailed)?;
        }
        Ok(())
    }
}
