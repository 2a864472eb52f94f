//! Locating nodes inside a [`DeviceTree`]

use crate::tree::{DeviceTree, EditError, NodeId};
use alloc::vec;
use alloc::vec::Vec;

/// Iterator over the live nodes of a tree in document order (depth first, parents before their children)
#[derive(Debug, Clone)]
pub struct NodeIter<'tree> {
    tree: &'tree DeviceTree,
    stack: Vec<NodeId>,
}

impl<'tree> Iterator for NodeIter<'tree> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        if let Ok(node) = self.tree.node(id) {
            self.stack.extend(node.children.iter().rev());
        }
        Some(id)
    }
}

/// Whether the path component `wanted` names the node `name`.
///
/// A component without unit address also matches a node that has one, so `memory` finds `memory@40000000`.
fn name_matches(name: &str, wanted: &str) -> bool {
    if name == wanted {
        return true;
    }
    !wanted.contains('@')
        && name
            .strip_prefix(wanted)
            .is_some_and(|rest| rest.starts_with('@'))
}

impl DeviceTree {
    /// Iterate over every node of the tree in document order
    pub fn nodes(&self) -> NodeIter<'_> {
        NodeIter {
            tree: self,
            stack: vec![self.root()],
        }
    }

    /// Iterate over the nodes following `after` in document order, or over all nodes if `after` is `None`.
    ///
    /// If `after` is no longer part of the tree the iterator is empty.
    fn nodes_after(&self, after: Option<NodeId>) -> impl Iterator<Item = NodeId> + '_ {
        let mut iter = self.nodes();
        let mut exhausted = false;
        if let Some(after) = after {
            exhausted = !iter.by_ref().any(|id| id == after);
        }
        iter.filter(move |_| !exhausted)
    }

    /// Find the direct child of `parent` that is named `name`
    pub fn find_child(&self, parent: NodeId, name: &str) -> Result<Option<NodeId>, EditError> {
        let node = self.node(parent)?;
        Ok(node
            .children
            .iter()
            .copied()
            .find(|child| self.name(*child).is_ok_and(|n| n == name)))
    }

    /// Search for the node located at the absolute `path`.
    ///
    /// Inside the path `/` acts as a separator which denotes a level of child node, so `cpu@0` in
    ///
    /// ```text
    /// / {
    ///   cpus {
    ///     cpu@0 {
    ///       …
    ///     }
    ///   }
    /// }
    /// ```
    ///
    /// is found at `/cpus/cpu@0`.
    pub fn find_node_by_path(&self, path: &str) -> Option<NodeId> {
        if !path.starts_with('/') {
            return None;
        }

        let mut current = self.root();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            let node = self.node(current).ok()?;
            current = node
                .children
                .iter()
                .copied()
                .find(|child| self.name(*child).is_ok_and(|n| name_matches(n, part)))?;
        }
        Some(current)
    }

    /// The first node in document order whose `compatible` property lists `tag`
    pub fn find_node_by_compatible(&self, tag: &str) -> Option<NodeId> {
        self.next_compatible(None, tag)
    }

    /// The next node after `after` in document order whose `compatible` property lists `tag`
    pub fn next_compatible(&self, after: Option<NodeId>, tag: &str) -> Option<NodeId> {
        self.nodes_after(after).find(|id| {
            self.get_property(*id, "compatible")
                .is_some_and(|p| p.contains_string(tag))
        })
    }

    /// The next node after `after` in document order which has a property `name` whose value is exactly `value`.
    ///
    /// Passing the previously returned node as `after` enumerates all matches.
    pub fn find_node_by_property_value(
        &self,
        after: Option<NodeId>,
        name: &str,
        value: &[u8],
    ) -> Option<NodeId> {
        self.nodes_after(after)
            .find(|id| self.get_property(*id, name).is_some_and(|p| p.value() == value))
    }
}
