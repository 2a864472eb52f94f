use device_tree::fdt::{FdtError, PackError};
use device_tree::tree::EditError;
use thiserror_no_std::Error;

/// The reason a fixup or the pipeline as a whole failed
#[derive(Debug, Error, Eq, PartialEq)]
pub enum FixupError {
    /// The buffer does not hold a blob that can be edited
    #[error("Invalid device tree blob: {0}")]
    InvalidBlob(#[from] FdtError),
    /// A secure memory node could not be removed
    #[error("Could not remove a secure memory node: {0}")]
    PruneFailed(EditError),
    /// The power management descriptor node could not be added
    #[error("Could not add the PSCI node: {0}")]
    PowerManagementFailed(EditError),
    /// The enable method of a cpu could not be set
    #[error("Could not add PSCI cpu enable methods: {0}")]
    CpuEnableMethodsFailed(EditError),
    /// A node or property that a fixup builds upon is not present
    #[error("The device tree does not contain {0}")]
    MissingDependency(&'static str),
    /// The dispatcher routing subtree could not be constructed
    #[error("Could not add the secure payload dispatcher node: {0}")]
    AnnotateFailed(EditError),
    /// The edited tree could not be written back
    #[error("Could not pack the device tree blob: {0}")]
    PackFailed(#[from] PackError),
}
