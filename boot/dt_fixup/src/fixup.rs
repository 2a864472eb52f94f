use crate::FixupError;
use core::fmt;
use device_tree::tree::DeviceTree;

/// The stages a blob passes through while being fixed up, in the order they are reached
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Stage {
    Unopened,
    Opened,
    Pruned,
    PmDescriptorAdded,
    CpuEnableMethodsAdded,
    DispatcherAnnotated,
    Packed,
}

impl Stage {
    /// The stages between opening and packing a blob which are reached by applying fixups
    pub const EDITS: [Stage; 4] = [
        Stage::Pruned,
        Stage::PmDescriptorAdded,
        Stage::CpuEnableMethodsAdded,
        Stage::DispatcherAnnotated,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Unopened => "unopened",
            Stage::Opened => "opened",
            Stage::Pruned => "secure memory pruned",
            Stage::PmDescriptorAdded => "PSCI node added",
            Stage::CpuEnableMethodsAdded => "cpu enable methods added",
            Stage::DispatcherAnnotated => "dispatcher annotated",
            Stage::Packed => "packed",
        };
        f.write_str(name)
    }
}

/// A single edit of the device tree
pub trait Fixup {
    /// Short name used in diagnostics
    fn name(&self) -> &'static str;

    /// The stage that is reached once this fixup has been applied
    fn stage(&self) -> Stage;

    fn apply(&self, tree: &mut DeviceTree) -> Result<(), FixupError>;
}
