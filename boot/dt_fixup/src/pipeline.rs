//! Sequencing of fixups
//!
//! A blob moves through the [`Stage`]s in order:
//!
//! ```text
//! Unopened → Opened → Pruned → PmDescriptorAdded → CpuEnableMethodsAdded → DispatcherAnnotated → Packed
//! ```
//!
//! Each edit stage is reached by applying the fixups that belong to it. Stages without configured fixups are passed
//! through. The first failure ends the run; nothing is retried and later fixups are not applied.

use crate::psci::{PsciCpuEnableMethods, PsciNode};
use crate::secure_mem::SecureMemPruner;
use crate::spd::DispatcherAnnotator;
use crate::{BootConfig, Fixup, FixupError, FixupSet, Stage};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use device_tree::fdt::FdtBlob;
use device_tree::tree::DeviceTree;

/// Describes where and why a pipeline run stopped
#[derive(Debug, Eq, PartialEq)]
pub struct PipelineFailure {
    /// The stage that could not be reached
    pub stage: Stage,
    /// Name of the step that failed
    pub step: &'static str,
    pub error: FixupError,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed before reaching stage '{}': {}",
            self.step, self.stage, self.error
        )
    }
}

fn fail(stage: Stage, step: &'static str, error: FixupError) -> PipelineFailure {
    let failure = PipelineFailure { stage, step, error };
    log::error!("Failed to fix up the Device Tree: {}", failure);
    failure
}

/// An ordered list of fixups
#[derive(Default)]
pub struct Pipeline {
    fixups: Vec<Box<dyn Fixup>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble the fixups that `config` enables
    pub fn from_config(config: &BootConfig) -> Self {
        let mut pipeline = Self::new();
        if config.fixups.contains(FixupSet::SECURE_MEM) {
            pipeline.push(SecureMemPruner);
        }
        if config.fixups.contains(FixupSet::PSCI_NODE) {
            pipeline.push(PsciNode {
                convention: config.psci,
            });
        }
        if config.fixups.contains(FixupSet::CPU_ENABLE_METHODS) {
            pipeline.push(PsciCpuEnableMethods);
        }
        if config.annotate_dispatcher() {
            pipeline.push(DispatcherAnnotator::default());
        }
        pipeline
    }

    pub fn push(&mut self, fixup: impl Fixup + 'static) {
        self.fixups.push(Box::new(fixup));
    }

    /// Names of the fixups in the order they are applied
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.ordered().into_iter().map(|f| f.name())
    }

    /// The fixups sorted by the stage they belong to, keeping the order in which they were added within a stage
    fn ordered(&self) -> Vec<&dyn Fixup> {
        let mut ordered: Vec<&dyn Fixup> = self.fixups.iter().map(|f| f.as_ref()).collect();
        ordered.sort_by_key(|f| f.stage());
        ordered
    }

    /// Apply all fixups to `tree` and return the last stage that was reached
    pub fn apply(&self, tree: &mut DeviceTree) -> Result<Stage, PipelineFailure> {
        let mut stage = Stage::Opened;
        for fixup in self.ordered() {
            fixup
                .apply(tree)
                .map_err(|e| fail(fixup.stage(), fixup.name(), e))?;
            if fixup.stage() > stage {
                stage = fixup.stage();
                log::debug!("device tree stage reached: {}", stage);
            }
        }
        Ok(Stage::DispatcherAnnotated.max(stage))
    }

    /// Open the blob in `buf`, apply all fixups and pack it again.
    ///
    /// Returns the length of the packed blob. The buffer is only written to if every fixup succeeded.
    pub fn run(&self, buf: &mut [u8], capacity: usize) -> Result<usize, PipelineFailure> {
        let mut blob =
            FdtBlob::open(buf, capacity).map_err(|e| fail(Stage::Opened, "open", e.into()))?;
        log::debug!("device tree stage reached: {}", Stage::Opened);

        self.apply(blob.tree_mut())?;

        let len = blob
            .pack()
            .map_err(|e| fail(Stage::Packed, "pack", e.into()))?;
        log::debug!("device tree stage reached: {}", Stage::Packed);
        Ok(len)
    }
}

/// Apply the fixups enabled in `config` to the blob in `buf`.
///
/// The blob may grow up to `config.fdt_max_size` bytes. On failure the reason has already been logged and the
/// buffer still holds the original blob, which the next stage can be started with.
pub fn update_dt(buf: &mut [u8], config: &BootConfig) -> Result<usize, PipelineFailure> {
    let len = Pipeline::from_config(config).run(buf, config.fdt_max_size)?;
    log::info!("Updated Device Tree ({:#x} bytes)", len);
    Ok(len)
}

/// Apply the fixups enabled in `config` to the blob located at `config.fdt_addr`.
///
/// # Safety
/// `config.fdt_addr` must be 8-byte aligned and point to `config.fdt_max_size` bytes of memory which are readable,
/// writable and not accessed through other means while the fixups run.
pub unsafe fn update_dt_at(config: &BootConfig) -> Result<usize, PipelineFailure> {
    let buf = core::slice::from_raw_parts_mut(config.fdt_addr as *mut u8, config.fdt_max_size);
    update_dt(buf, config)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::Dispatcher;
    use device_tree::tree::EditError;

    /// Adds a root child named after itself
    struct Marker(&'static str, Stage);

    impl Fixup for Marker {
        fn name(&self) -> &'static str {
            self.0
        }

        fn stage(&self) -> Stage {
            self.1
        }

        fn apply(&self, tree: &mut DeviceTree) -> Result<(), FixupError> {
            let root = tree.root();
            tree.add_child(root, self.0)
                .map(|_| ())
                .map_err(FixupError::AnnotateFailed)
        }
    }

    struct Failing(Stage);

    impl Fixup for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn stage(&self) -> Stage {
            self.0
        }

        fn apply(&self, _tree: &mut DeviceTree) -> Result<(), FixupError> {
            Err(FixupError::MissingDependency("everything"))
        }
    }

    fn root_children(tree: &DeviceTree) -> Vec<&str> {
        tree.children(tree.root())
            .unwrap()
            .iter()
            .map(|c| tree.name(*c).unwrap())
            .collect()
    }

    #[test]
    fn fixups_run_in_stage_order() {
        let mut pipeline = Pipeline::new();
        pipeline.push(Marker("spd", Stage::DispatcherAnnotated));
        pipeline.push(Marker("prune", Stage::Pruned));
        pipeline.push(Marker("cpus", Stage::CpuEnableMethodsAdded));
        pipeline.push(Marker("psci", Stage::PmDescriptorAdded));
        pipeline.push(Marker("prune-again", Stage::Pruned));

        let mut tree = DeviceTree::new(0x1000).unwrap();
        assert_eq!(pipeline.apply(&mut tree), Ok(Stage::DispatcherAnnotated));
        assert_eq!(
            root_children(&tree),
            ["prune", "prune-again", "psci", "cpus", "spd"]
        );
    }

    #[test]
    fn first_failure_stops_the_run() {
        let mut pipeline = Pipeline::new();
        pipeline.push(Marker("prune", Stage::Pruned));
        pipeline.push(Failing(Stage::PmDescriptorAdded));
        pipeline.push(Marker("spd", Stage::DispatcherAnnotated));

        let mut tree = DeviceTree::new(0x1000).unwrap();
        assert_eq!(
            pipeline.apply(&mut tree),
            Err(PipelineFailure {
                stage: Stage::PmDescriptorAdded,
                step: "failing",
                error: FixupError::MissingDependency("everything"),
            })
        );
        assert_eq!(root_children(&tree), ["prune"]);
    }

    #[test]
    fn empty_pipeline_passes_through_all_stages() {
        let mut tree = DeviceTree::new(0x1000).unwrap();
        assert_eq!(Pipeline::new().apply(&mut tree), Ok(Stage::DispatcherAnnotated));
    }

    #[test]
    fn config_selects_fixups() {
        let config = BootConfig::default();
        assert_eq!(
            Pipeline::from_config(&config).names().collect::<Vec<_>>(),
            ["secure-mem", "psci", "cpu-enable"]
        );

        let config = BootConfig {
            dispatcher: Dispatcher::Trusty,
            fixups: FixupSet::SECURE_MEM | FixupSet::DISPATCHER,
            ..BootConfig::default()
        };
        assert_eq!(
            Pipeline::from_config(&config).names().collect::<Vec<_>>(),
            ["secure-mem", "spd"]
        );

        let config = BootConfig {
            dispatcher: Dispatcher::Opteed,
            ..BootConfig::default()
        };
        assert!(!Pipeline::from_config(&config).names().any(|n| n == "spd"));
    }

    #[repr(C, align(8))]
    pub struct AlignedBuffer<const LENGTH: usize>(pub [u8; LENGTH]);

    #[test]
    fn failed_run_leaves_buffer_untouched() {
        let mut buf = AlignedBuffer([0u8; 0x200]);
        let tree = DeviceTree::new(0x200).unwrap();
        tree.pack_into(&mut buf.0).unwrap();
        let original = buf.0;

        let mut pipeline = Pipeline::new();
        pipeline.push(Marker("psci", Stage::PmDescriptorAdded));
        pipeline.push(Failing(Stage::DispatcherAnnotated));
        let failure = pipeline.run(&mut buf.0, 0x200).unwrap_err();
        assert_eq!(failure.stage, Stage::DispatcherAnnotated);
        assert_eq!(buf.0, original);
    }

    #[test]
    fn invalid_blob_fails_at_open() {
        let mut buf = AlignedBuffer([0u8; 0x100]);
        let failure = Pipeline::new().run(&mut buf.0, 0x100).unwrap_err();
        assert_eq!(failure.stage, Stage::Opened);
        assert_eq!(failure.step, "open");
        assert!(matches!(failure.error, FixupError::InvalidBlob(_)));
    }

    #[test]
    fn out_of_space_is_reported_with_stage() {
        // an empty tree takes 0x48 bytes, leaving room for one of the nodes
        let mut buf = AlignedBuffer([0u8; 0x70]);
        let tree = DeviceTree::new(0x70).unwrap();
        tree.pack_into(&mut buf.0).unwrap();

        let mut pipeline = Pipeline::new();
        for name in ["a-long-node-name", "another-long-node-name"] {
            pipeline.push(Marker(name, Stage::PmDescriptorAdded));
        }
        let failure = pipeline.run(&mut buf.0, 0x70).unwrap_err();
        assert_eq!(failure.stage, Stage::PmDescriptorAdded);
        assert_eq!(failure.step, "another-long-node-name");
        assert!(matches!(
            failure.error,
            FixupError::AnnotateFailed(EditError::OutOfSpace { capacity: 0x70, .. })
        ));
    }
}
