//! Removal of memory nodes that only the secure world may use
//!
//! QEMU describes the secure memory as an ordinary `memory` node that is disabled for the normal world
//! (`status = "disabled"`) but available to the secure world (`secure-status = "okay"`).
//! Operating systems do not understand that distinction and would allocate from it, so such nodes are removed.

use crate::{Fixup, FixupError, Stage};
use device_tree::tree::{DeviceTree, NodeId};

/// Value of the `device_type` property of memory nodes, including its terminator
const MEMORY_DEVICE_TYPE: &[u8] = b"memory\0";

#[derive(Debug, Default, Copy, Clone)]
pub struct SecureMemPruner;

fn is_secure_only(tree: &DeviceTree, node: NodeId) -> bool {
    let prop_is = |name: &str, expected: &str| {
        tree.get_property(node, name)
            .and_then(|p| p.as_str())
            .is_some_and(|value| value == expected)
    };
    prop_is("status", "disabled") && prop_is("secure-status", "okay")
}

impl SecureMemPruner {
    /// Remove all secure memory nodes and return how many were removed
    pub fn prune(&self, tree: &mut DeviceTree) -> Result<usize, FixupError> {
        let mut removed = 0;
        let mut cursor = None;
        while let Some(node) =
            tree.find_node_by_property_value(cursor, "device_type", MEMORY_DEVICE_TYPE)
        {
            if !is_secure_only(tree, node) {
                cursor = Some(node);
                continue;
            }

            let path = tree.path(node).map_err(FixupError::PruneFailed)?;
            tree.delete_subtree(node)
                .map_err(FixupError::PruneFailed)?;
            log::info!("Removed secure memory node {}", path);
            removed += 1;
            // the cursor node is gone so the scan has to start over
            cursor = None;
        }
        Ok(removed)
    }
}

impl Fixup for SecureMemPruner {
    fn name(&self) -> &'static str {
        "secure-mem"
    }

    fn stage(&self) -> Stage {
        Stage::Pruned
    }

    fn apply(&self, tree: &mut DeviceTree) -> Result<(), FixupError> {
        self.prune(tree).map(|_| ())
    }
}
