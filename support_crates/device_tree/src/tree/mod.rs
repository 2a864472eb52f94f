//! An editable device tree
//!
//! [`DeviceTree`] is the working representation of a blob while it is being modified.
//! Nodes are stored in an arena and referenced by [`NodeId`] indices so that nodes can be added and removed
//! without invalidating references to unrelated nodes.
//! A deleted node leaves a tombstone in the arena; using its id afterwards yields [`EditError::StaleNode`].
//!
//! The tree keeps track of the size its serialized form would have and refuses every modification that would make
//! it larger than the capacity of the buffer it will eventually be packed into.

mod phandle;
mod property;
mod search;

pub use phandle::{Phandle, LEGACY_PHANDLE_PROP, PHANDLE_PROP};
pub use property::{cells_to_bytes, Property};
pub use search::NodeIter;

use crate::fdt::tokens::{align_to_token, PROP_HEADER_SIZE, TOKEN_SIZE};
use crate::fdt::{FdtHeader, MemoryReservationBlock, MemoryReservationEntry, StringTable};
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use thiserror_no_std::Error;

/// Errors that can occur when inspecting or modifying a [`DeviceTree`]
#[derive(Debug, Error, Eq, PartialEq)]
pub enum EditError {
    /// The modification would make the serialized tree larger than the buffer it lives in
    #[error("The modification requires {needed} bytes but the blob capacity is only {capacity} bytes")]
    OutOfSpace { needed: usize, capacity: usize },
    /// The node was deleted or never belonged to this tree
    #[error("The node {0:?} does not exist in this tree")]
    StaleNode(NodeId),
    /// The root node cannot be deleted
    #[error("The root node cannot be deleted")]
    RootNode,
    /// The node does not carry a valid handle
    #[error("The node {0:?} does not have a phandle")]
    NoPhandle(NodeId),
    /// Every handle value is already in use
    #[error("There are no unused phandle values left")]
    HandleSpaceExhausted,
    /// The name cannot be used for a node or property
    #[error("{0:?} is not a valid node or property name")]
    InvalidName(String),
    /// The parent already has a child of that name
    #[error("A node named {0:?} already exists at that location")]
    DuplicateNode(String),
}

/// Index of a node inside a [`DeviceTree`]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(usize);

/// A single node of the tree
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) props: Vec<Property>,
}

impl Node {
    /// The node's unit name, including the unit address if there is one
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn properties(&self) -> &[Property] {
        &self.props
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.props.iter().find(|p| p.name == name)
    }
}

/// Bytes a node occupies in the structure block, not counting its properties and children
pub(crate) const fn node_cost(name_len: usize) -> usize {
    TOKEN_SIZE + align_to_token(name_len + 1) + TOKEN_SIZE
}

/// Bytes a property with a value of `value_len` bytes occupies in the structure block
pub(crate) const fn prop_cost(value_len: usize) -> usize {
    PROP_HEADER_SIZE + align_to_token(value_len)
}

/// Size of the structure block holding only an empty root node
const EMPTY_STRUCT_SIZE: usize = node_cost(0) + TOKEN_SIZE;

/// An editable device tree bounded by a fixed capacity
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DeviceTree {
    arena: Vec<Option<Node>>,
    root: NodeId,
    pub(crate) strings: StringTable,
    pub(crate) reservations: Vec<MemoryReservationEntry>,
    pub(crate) boot_cpuid_phys: u32,
    /// Current size of the structure block including the `FDT_END` token
    struct_size: usize,
    capacity: usize,
}

impl DeviceTree {
    /// Create a tree which only contains an empty root node
    pub fn new(capacity: usize) -> Result<Self, EditError> {
        let tree = Self {
            arena: vec![Some(Node {
                name: String::new(),
                parent: None,
                children: Vec::new(),
                props: Vec::new(),
            })],
            root: NodeId(0),
            strings: StringTable::new(),
            reservations: Vec::new(),
            boot_cpuid_phys: 0,
            struct_size: EMPTY_STRUCT_SIZE,
            capacity,
        };
        tree.ensure_room(0)?;
        Ok(tree)
    }

    pub(crate) fn from_parts(
        strings: StringTable,
        reservations: Vec<MemoryReservationEntry>,
        boot_cpuid_phys: u32,
        capacity: usize,
    ) -> Self {
        Self {
            arena: Vec::new(),
            root: NodeId(0),
            strings,
            reservations,
            boot_cpuid_phys,
            struct_size: TOKEN_SIZE,
            capacity,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The buffer capacity the serialized tree must fit into
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size in bytes the tree occupies when packed
    pub fn size(&self) -> usize {
        FdtHeader::SIZE
            + MemoryReservationBlock::encoded_size(&self.reservations)
            + self.struct_size
            + self.strings.len()
    }

    pub(crate) fn struct_size(&self) -> usize {
        self.struct_size
    }

    pub fn boot_cpuid_phys(&self) -> u32 {
        self.boot_cpuid_phys
    }

    pub fn memory_reservations(&self) -> &[MemoryReservationEntry] {
        &self.reservations
    }

    /// Number of live nodes, including the root
    pub fn node_count(&self) -> usize {
        self.arena.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, EditError> {
        self.arena
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(EditError::StaleNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, EditError> {
        self.arena
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(EditError::StaleNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    pub fn name(&self, id: NodeId) -> Result<&str, EditError> {
        Ok(self.node(id)?.name())
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, EditError> {
        Ok(self.node(id)?.parent)
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId], EditError> {
        Ok(self.node(id)?.children())
    }

    /// The absolute path of a node, e.g. `/cpus/cpu@0`
    pub fn path(&self, id: NodeId) -> Result<String, EditError> {
        let mut parts = Vec::new();
        let mut current = id;
        while let Some(parent) = self.node(current)?.parent {
            parts.push(current);
            current = parent;
        }
        if parts.is_empty() {
            return Ok(String::from("/"));
        }
        let mut path = String::new();
        for part in parts.iter().rev() {
            path.push('/');
            path.push_str(self.name(*part)?);
        }
        Ok(path)
    }

    pub fn get_property(&self, id: NodeId, name: &str) -> Option<&Property> {
        self.node(id).ok()?.property(name)
    }

    fn ensure_room(&self, growth: usize) -> Result<(), EditError> {
        let needed = self.size() + growth;
        if needed > self.capacity {
            log::debug!(
                "refusing to grow device tree to {:#x} bytes (capacity {:#x})",
                needed,
                self.capacity
            );
            return Err(EditError::OutOfSpace {
                needed,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    fn validate_node_name(name: &str) -> Result<(), EditError> {
        if name.is_empty() || name.contains('/') || name.contains('\0') {
            return Err(EditError::InvalidName(String::from(name)));
        }
        Ok(())
    }

    fn validate_prop_name(name: &str) -> Result<(), EditError> {
        if name.is_empty() || name.contains('\0') {
            return Err(EditError::InvalidName(String::from(name)));
        }
        Ok(())
    }

    /// Create a new, empty node as the last child of `parent`
    pub fn add_child(&mut self, parent: NodeId, name: &str) -> Result<NodeId, EditError> {
        Self::validate_node_name(name)?;
        if self.find_child(parent, name)?.is_some() {
            return Err(EditError::DuplicateNode(String::from(name)));
        }
        let cost = node_cost(name.len());
        self.ensure_room(cost)?;

        let id = self.push_node(Some(parent), name);
        self.struct_size += cost;
        Ok(id)
    }

    /// Insert a node without any size accounting. Used while reading a blob.
    pub(crate) fn push_node(&mut self, parent: Option<NodeId>, name: &str) -> NodeId {
        let id = NodeId(self.arena.len());
        self.arena.push(Some(Node {
            name: String::from(name),
            parent,
            children: Vec::new(),
            props: Vec::new(),
        }));
        match parent {
            Some(parent) => {
                if let Some(Some(p)) = self.arena.get_mut(parent.0) {
                    p.children.push(id);
                }
            }
            None => self.root = id,
        }
        id
    }

    /// Append a property read from a blob without any size accounting
    pub(crate) fn push_parsed_property(
        &mut self,
        node: NodeId,
        name: &str,
        name_offset: u32,
        value: &[u8],
    ) -> Result<(), EditError> {
        self.node_mut(node)?.props.push(Property {
            name: String::from(name),
            name_offset,
            value: value.to_vec(),
        });
        Ok(())
    }

    pub(crate) fn set_struct_size(&mut self, struct_size: usize) {
        self.struct_size = struct_size;
    }

    /// Remove a node together with all of its descendants
    pub fn delete_subtree(&mut self, id: NodeId) -> Result<(), EditError> {
        let parent = self.node(id)?.parent.ok_or(EditError::RootNode)?;

        let mut doomed = vec![id];
        let mut freed = 0;
        let mut i = 0;
        while let Some(current) = doomed.get(i).copied() {
            let node = self.node(current)?;
            freed += node_cost(node.name.len());
            freed += node.props.iter().map(|p| prop_cost(p.value.len())).sum::<usize>();
            doomed.extend_from_slice(&node.children);
            i += 1;
        }

        self.node_mut(parent)?.children.retain(|child| *child != id);
        for current in doomed {
            self.arena[current.0] = None;
        }
        self.struct_size -= freed;
        Ok(())
    }

    /// Set a property, replacing its value if it exists or appending it to the node's properties if it does not
    pub fn set_property(&mut self, node: NodeId, name: &str, value: &[u8]) -> Result<(), EditError> {
        Self::validate_prop_name(name)?;
        match self.node(node)?.props.iter().position(|p| p.name == name) {
            Some(i) => {
                let old_cost = prop_cost(self.node(node)?.props[i].value.len());
                let new_cost = prop_cost(value.len());
                self.ensure_room(new_cost.saturating_sub(old_cost))?;

                let prop = &mut self.node_mut(node)?.props[i];
                prop.value.clear();
                prop.value.extend_from_slice(value);
                self.struct_size = self.struct_size + new_cost - old_cost;
            }
            None => self.insert_property(node, name, value)?,
        }
        Ok(())
    }

    /// Grow an existing property by appending `value` to it, creating the property if it does not exist yet
    pub fn append_property_value(
        &mut self,
        node: NodeId,
        name: &str,
        value: &[u8],
    ) -> Result<(), EditError> {
        Self::validate_prop_name(name)?;
        match self.node(node)?.props.iter().position(|p| p.name == name) {
            Some(i) => {
                let old_len = self.node(node)?.props[i].value.len();
                let growth = prop_cost(old_len + value.len()) - prop_cost(old_len);
                self.ensure_room(growth)?;

                self.node_mut(node)?.props[i].value.extend_from_slice(value);
                self.struct_size += growth;
            }
            None => self.insert_property(node, name, value)?,
        }
        Ok(())
    }

    fn insert_property(&mut self, node: NodeId, name: &str, value: &[u8]) -> Result<(), EditError> {
        let cost = prop_cost(value.len());
        self.ensure_room(cost + self.strings.growth_for(name))?;

        let name_offset = self.strings.intern(name);
        self.node_mut(node)?.props.push(Property {
            name: String::from(name),
            name_offset,
            value: value.to_vec(),
        });
        self.struct_size += cost;
        Ok(())
    }

    /// Remove a property if it exists and return whether it did
    pub fn delete_property(&mut self, node: NodeId, name: &str) -> Result<bool, EditError> {
        let props = &mut self.node_mut(node)?.props;
        let Some(i) = props.iter().position(|p| p.name == name) else {
            return Ok(false);
        };
        let prop = props.remove(i);
        self.struct_size -= prop_cost(prop.value.len());
        Ok(true)
    }

    pub fn set_property_u32(&mut self, node: NodeId, name: &str, value: u32) -> Result<(), EditError> {
        self.set_property(node, name, &value.to_be_bytes())
    }

    /// Set a property to a single zero-terminated string
    pub fn set_property_string(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), EditError> {
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(0);
        self.set_property(node, name, &bytes)
    }

    pub fn append_property_u32(&mut self, node: NodeId, name: &str, value: u32) -> Result<(), EditError> {
        self.append_property_value(node, name, &value.to_be_bytes())
    }

    /// Append a zero-terminated string to a string list property
    pub fn append_property_string(
        &mut self,
        node: NodeId,
        name: &str,
        value: &str,
    ) -> Result<(), EditError> {
        let mut bytes = Vec::with_capacity(value.len() + 1);
        bytes.extend_from_slice(value.as_bytes());
        bytes.push(0);
        self.append_property_value(node, name, &bytes)
    }

    /// Add an entry to the memory reservation block
    pub fn add_memory_reservation(&mut self, entry: MemoryReservationEntry) -> Result<(), EditError> {
        self.ensure_room(crate::fdt::memory_reservation::ENTRY_SIZE)?;
        self.reservations.push(entry);
        Ok(())
    }

    /// Recompute the structure block size by walking the tree
    pub(crate) fn measure_struct_size(&self) -> usize {
        let mut size = TOKEN_SIZE; // FDT_END
        for id in self.nodes() {
            if let Ok(node) = self.node(id) {
                size += node_cost(node.name.len());
                size += node.props.iter().map(|p| prop_cost(p.value.len())).sum::<usize>();
            }
        }
        size
    }
}
