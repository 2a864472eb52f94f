//! Node handles (*phandles*) which other nodes use to reference a node

use crate::tree::{DeviceTree, EditError, NodeId};
use core::fmt;

/// Name of the property holding a node's handle
pub const PHANDLE_PROP: &str = "phandle";

/// Name of the property that older blobs use instead of [`PHANDLE_PROP`]
pub const LEGACY_PHANDLE_PROP: &str = "linux,phandle";

/// A valid node handle.
///
/// The values `0` and `0xffffffff` are reserved by the device tree specification and never represent a handle.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Phandle(u32);

impl Phandle {
    /// The largest value that can be used as a handle
    pub const MAX: u32 = 0xffff_fffe;

    pub const fn new(value: u32) -> Option<Self> {
        match value {
            0 | 0xffff_ffff => None,
            v => Some(Self(v)),
        }
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Phandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl DeviceTree {
    /// Return the handle of `node` if it carries a valid one
    pub fn get_handle(&self, node: NodeId) -> Result<Phandle, EditError> {
        let n = self.node(node)?;
        n.property(PHANDLE_PROP)
            .or_else(|| n.property(LEGACY_PHANDLE_PROP))
            .and_then(|p| p.as_u32())
            .and_then(Phandle::new)
            .ok_or(EditError::NoPhandle(node))
    }

    /// The largest handle present anywhere in the tree
    pub fn max_handle(&self) -> Option<Phandle> {
        self.nodes()
            .filter_map(|node| self.get_handle(node).ok())
            .max()
    }

    /// The smallest handle value that is larger than every handle currently present in the tree
    pub fn next_free_handle(&self) -> Result<Phandle, EditError> {
        match self.max_handle() {
            None => Ok(Phandle(1)),
            Some(max) if max.get() >= Phandle::MAX => Err(EditError::HandleSpaceExhausted),
            Some(max) => Ok(Phandle(max.get() + 1)),
        }
    }

    /// Give `node` a fresh handle unless it already has one, and return the node's handle
    pub fn allocate_handle(&mut self, node: NodeId) -> Result<Phandle, EditError> {
        if let Ok(existing) = self.get_handle(node) {
            return Ok(existing);
        }
        let handle = self.next_free_handle()?;
        self.set_property_u32(node, PHANDLE_PROP, handle.get())?;
        log::trace!("allocated phandle {} for {}", handle, self.path(node)?);
        Ok(handle)
    }
}
