//! Interrupt routing information for the secure payload dispatcher
//!
//! When a trusted OS such as Trusty runs in the secure world, its normal world driver needs to know how the
//! trusted OS signals it. This fixup adds a subtree describing that:
//!
//! ```text
//! / {
//!     interrupt-controller {              // shim for drivers predating Linux 5.10
//!         compatible = "android,CustomIPI";
//!         #interrupt-cells = <1>;
//!         interrupt-controller = <0>;
//!         phandle = <ipi>;
//!     };
//!     trusty {
//!         compatible = "android,trusty-smc-v1";
//!         ranges = <0>;
//!         #address-cells = <2>;
//!         #size-cells = <2>;
//!         irq {
//!             compatible = "android,trusty-irq-v1";
//!             interrupt-templates = <ipi 0 GIC_PPI 4>, <gic 0 GIC_SPI 4>;
//!             interrupt-ranges = <0 15 0>, <16 31 1>, <32 63 2>;
//!             ipi-range = <8 15 8>;
//!             interrupts = <non-secure timer interrupt>;
//!         };
//!         log { compatible = "android,trusty-log-v1"; };
//!         test { compatible = "android,trusty-test-v1"; };
//!         virtio { compatible = "android,trusty-virtio-v1"; };
//!     };
//! };
//! ```

use crate::{Fixup, FixupError, Stage};
use alloc::format;
use alloc::vec::Vec;
use device_tree::tree::{DeviceTree, EditError, NodeId, Phandle};

/// Shared peripheral interrupt
pub const GIC_SPI: u32 = 0;
/// Private (per cpu) peripheral interrupt
pub const GIC_PPI: u32 = 1;

/// Compatible strings of supported interrupt controllers, in order of preference
const GIC_COMPATIBLE: [&str; 2] = ["arm,cortex-a15-gic", "arm,gic-v3"];

/// Compatible strings of the architected timer, in order of preference
const TIMER_COMPATIBLE: [&str; 2] = ["arm,armv8-timer", "arm,armv7-timer"];

/// Name of the node that emulates the legacy inter-processor interrupt controller
const IPI_NODE: &str = "interrupt-controller";

/// Number of cells in each `interrupt-templates` entry
const TEMPLATE_CELLS: u32 = 4;

/// `{begin, end, template}` entries of `interrupt-ranges`
const INTERRUPT_RANGES: [[u32; 3]; 3] = [[0, 15, 0], [16, 31, 1], [32, 63, 2]];

/// `{begin, end, base}` of the lines reserved for inter-processor interrupts
const IPI_RANGE: [u32; 3] = [8, 15, 8];

/// Names and compatible strings of the nodes that describe a dispatcher
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DispatcherProfile {
    /// Name of the node below `/` which holds the whole subtree
    pub node_name: &'static str,
    pub compatible: &'static str,
    /// Name of the node which describes interrupt routing
    pub irq_node_name: &'static str,
    pub irq_compatible: &'static str,
    pub ipi_compatible: &'static str,
    /// Channel nodes below the dispatcher node as `(name, compatible)`
    pub channels: [(&'static str, &'static str); 3],
}

impl DispatcherProfile {
    pub const TRUSTY: Self = Self {
        node_name: "trusty",
        compatible: "android,trusty-smc-v1",
        irq_node_name: "irq",
        irq_compatible: "android,trusty-irq-v1",
        ipi_compatible: "android,CustomIPI",
        channels: [
            ("log", "android,trusty-log-v1"),
            ("test", "android,trusty-test-v1"),
            ("virtio", "android,trusty-virtio-v1"),
        ],
    };
}

/// Everything that has to be read from the tree before it is modified
struct Dependencies {
    gic: Phandle,
    /// The part of the timer's `interrupts` value that describes the non-secure timer
    timer_interrupts: Vec<u8>,
}

fn find_first_compatible(tree: &DeviceTree, candidates: &[&str]) -> Option<NodeId> {
    candidates
        .iter()
        .find_map(|compatible| tree.find_node_by_compatible(compatible))
}

/// The second half of an interrupt specifier list that contains a secure and a non-secure half of equal length
fn non_secure_half(interrupts: &[u8]) -> &[u8] {
    let cells = interrupts.len() / 4;
    &interrupts[(cells / 2) * 4..]
}

/// Adds the interrupt routing subtree of a dispatcher
#[derive(Debug, Copy, Clone)]
pub struct DispatcherAnnotator {
    pub profile: DispatcherProfile,
}

impl Default for DispatcherAnnotator {
    fn default() -> Self {
        Self {
            profile: DispatcherProfile::TRUSTY,
        }
    }
}

impl DispatcherAnnotator {
    fn lookup(&self, tree: &DeviceTree) -> Result<Dependencies, FixupError> {
        let gic = find_first_compatible(tree, &GIC_COMPATIBLE)
            .ok_or(FixupError::MissingDependency("a supported interrupt controller"))?;
        let gic = tree.get_handle(gic).map_err(|_| {
            log::warn!("Failed to get gic phandle");
            FixupError::MissingDependency("a phandle of the interrupt controller")
        })?;
        log::info!("Found gic phandle {}", gic);

        let timer = find_first_compatible(tree, &TIMER_COMPATIBLE)
            .ok_or(FixupError::MissingDependency("an architected timer"))?;
        let interrupts = tree
            .get_property(timer, "interrupts")
            .ok_or(FixupError::MissingDependency("the interrupts of the architected timer"))?;

        Ok(Dependencies {
            gic,
            timer_interrupts: non_secure_half(interrupts.value()).to_vec(),
        })
    }

    fn add_subtree(&self, tree: &mut DeviceTree, deps: &Dependencies) -> Result<(), EditError> {
        let profile = &self.profile;
        let root = tree.root();

        let ipi_node = tree.add_child(root, IPI_NODE)?;
        let ipi = tree.allocate_handle(ipi_node)?;
        log::info!("Allocated ipi phandle {}", ipi);
        tree.append_property_string(ipi_node, "compatible", profile.ipi_compatible)?;
        tree.set_property_u32(ipi_node, "#interrupt-cells", 1)?;
        tree.set_property_u32(ipi_node, "interrupt-controller", 0)?;

        let dispatcher = tree.add_child(root, profile.node_name)?;
        tree.append_property_string(dispatcher, "compatible", profile.compatible)?;
        tree.set_property_u32(dispatcher, "ranges", 0)?;
        tree.set_property_u32(dispatcher, "#address-cells", 2)?;
        tree.set_property_u32(dispatcher, "#size-cells", 2)?;

        let irq = tree.add_child(dispatcher, profile.irq_node_name)?;
        tree.append_property_string(irq, "compatible", profile.irq_compatible)?;
        let templates = [
            [ipi.get(), 0, GIC_PPI, TEMPLATE_CELLS],
            [deps.gic.get(), 0, GIC_SPI, TEMPLATE_CELLS],
        ];
        for cell in templates.iter().flatten() {
            tree.append_property_u32(irq, "interrupt-templates", *cell)?;
        }
        for cell in INTERRUPT_RANGES.iter().flatten() {
            tree.append_property_u32(irq, "interrupt-ranges", *cell)?;
        }
        for cell in IPI_RANGE {
            tree.append_property_u32(irq, "ipi-range", cell)?;
        }

        for (name, compatible) in profile.channels {
            let channel = tree.add_child(dispatcher, name)?;
            tree.append_property_string(channel, "compatible", compatible)?;
        }

        tree.set_property(irq, "interrupts", &deps.timer_interrupts)?;
        Ok(())
    }
}

impl Fixup for DispatcherAnnotator {
    fn name(&self) -> &'static str {
        "spd"
    }

    fn stage(&self) -> Stage {
        Stage::DispatcherAnnotated
    }

    fn apply(&self, tree: &mut DeviceTree) -> Result<(), FixupError> {
        if tree
            .find_node_by_path(&format!("/{}", self.profile.node_name))
            .is_some()
        {
            log::warn!("{} Device Tree node already exists!", self.profile.node_name);
            return Ok(());
        }

        let deps = self.lookup(tree)?;
        self.add_subtree(tree, &deps)
            .map_err(FixupError::AnnotateFailed)
    }
}
