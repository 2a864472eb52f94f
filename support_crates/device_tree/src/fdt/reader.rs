//! Reading the structure block into an editable [`DeviceTree`]

use crate::fdt::strings::{StringTable, StringsError};
use crate::fdt::tokens::{TokenCursor, FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_PROP};
use crate::tree::{DeviceTree, NodeId};
use alloc::vec::Vec;
use thiserror_no_std::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum StructureError {
    #[error("The structure block does not start with a FDT_BEGIN_NODE token")]
    NoNodeBeginToken,
    #[error("The structure block ended before all nodes were closed")]
    NoNodeEndToken,
    #[error("The structure block does not contain a FDT_END token at the end")]
    NoStructEndToken,
    #[error("A FDT_BEGIN_NODE token at offset {0} was not followed by a string encoding the nodes name")]
    NoNodeName(usize),
    #[error("The node name at offset {0} is not valid UTF-8 even though node names are restricted to an ASCII subset")]
    InvalidNodeName(usize),
    #[error("The name of the root node is not empty")]
    InvalidRootNodeName,
    #[error("There is more than one root node")]
    MultipleRootNodes,
    #[error("The property at offset {0} is truncated")]
    TruncatedProperty(usize),
    #[error("The property at offset {0} appears outside of a node or after a child node")]
    MisplacedProperty(usize),
    #[error("The property at offset {offset} has an invalid name: {source}")]
    PropertyName { offset: usize, source: StringsError },
    #[error("Unknown token {token:#x} at offset {offset}")]
    UnknownToken { token: u32, offset: usize },
}

/// Parse the structure block `buf` and add its nodes to `tree`.
///
/// `tree` must not contain any nodes yet. On success the tree's structure size is set to the size of the
/// minimal encoding of what was read, which may be smaller than `buf` if the blob contained `FDT_NOP` tokens.
pub(crate) fn read_structure(
    buf: &[u8],
    strings: &StringTable,
    tree: &mut DeviceTree,
) -> Result<(), StructureError> {
    let mut cursor = TokenCursor::new(buf);
    let mut stack: Vec<NodeId> = Vec::new();
    let mut root_closed = false;
    let mut struct_size = 0;

    loop {
        let token = match cursor.next_token() {
            Some(token) => token,
            None if root_closed => return Err(StructureError::NoStructEndToken),
            None if stack.is_empty() => return Err(StructureError::NoNodeBeginToken),
            None => return Err(StructureError::NoNodeEndToken),
        };
        let token_start = cursor.position() - 4;

        match token {
            FDT_BEGIN_NODE => {
                if root_closed {
                    return Err(StructureError::MultipleRootNodes);
                }
                let name = cursor
                    .read_cstr()
                    .ok_or(StructureError::NoNodeName(token_start))?
                    .to_str()
                    .map_err(|_| StructureError::InvalidNodeName(token_start))?;

                let parent = stack.last().copied();
                if parent.is_none() && !name.is_empty() {
                    return Err(StructureError::InvalidRootNodeName);
                }
                stack.push(tree.push_node(parent, name));
                struct_size += crate::tree::node_cost(name.len());
            }
            FDT_PROP => {
                let node = *stack
                    .last()
                    .ok_or(StructureError::MisplacedProperty(token_start))?;
                let has_children = tree
                    .children(node)
                    .map(|c| !c.is_empty())
                    .unwrap_or(true);
                if has_children {
                    return Err(StructureError::MisplacedProperty(token_start));
                }

                let len = cursor
                    .read_u32()
                    .ok_or(StructureError::TruncatedProperty(token_start))?;
                let name_offset = cursor
                    .read_u32()
                    .ok_or(StructureError::TruncatedProperty(token_start))?;
                let value = cursor
                    .read_bytes(len as usize)
                    .ok_or(StructureError::TruncatedProperty(token_start))?;
                let name = strings.get_string(name_offset as usize).map_err(|source| {
                    StructureError::PropertyName {
                        offset: token_start,
                        source,
                    }
                })?;

                tree.push_parsed_property(node, name, name_offset, value)
                    .map_err(|_| StructureError::MisplacedProperty(token_start))?;
                struct_size += crate::tree::prop_cost(value.len());
            }
            FDT_END_NODE => {
                if stack.pop().is_none() {
                    return Err(StructureError::NoNodeBeginToken);
                }
                root_closed = stack.is_empty();
            }
            FDT_END => {
                if !root_closed {
                    return Err(if stack.is_empty() {
                        StructureError::NoNodeBeginToken
                    } else {
                        StructureError::NoNodeEndToken
                    });
                }
                // FDT_END token itself
                tree.set_struct_size(struct_size + 4);
                return Ok(());
            }
            token => {
                return Err(StructureError::UnknownToken {
                    token,
                    offset: token_start,
                });
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fdt::tokens::FDT_NOP;

    fn empty_tree() -> DeviceTree {
        DeviceTree::from_parts(StringTable::new(), Vec::new(), 0, 0x1000)
    }

    #[test]
    fn read_empty_root() {
        let mut buf = [0u8; 16];
        buf[0..4].copy_from_slice(&FDT_BEGIN_NODE.to_be_bytes());
        buf[4..8].copy_from_slice(b"\0\0\0\0");
        buf[8..12].copy_from_slice(&FDT_END_NODE.to_be_bytes());
        buf[12..16].copy_from_slice(&FDT_END.to_be_bytes());

        let mut tree = empty_tree();
        read_structure(&buf, &StringTable::new(), &mut tree).unwrap();
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.struct_size(), 16);
    }

    #[test]
    fn read_props_and_children() {
        let strings = StringTable::from_buffer(b"test\0");
        let mut buf = [0u8; 48];
        buf[0..4].copy_from_slice(&FDT_BEGIN_NODE.to_be_bytes()); // root node start
        buf[4..8].copy_from_slice(b"\0\0\0\0"); // name + padding
        buf[8..12].copy_from_slice(&FDT_PROP.to_be_bytes());
        buf[12..16].copy_from_slice(&2u32.to_be_bytes()); // property length = 2 bytes
        buf[16..20].copy_from_slice(&0u32.to_be_bytes()); // property name reference = 0
        buf[20..22].copy_from_slice(&[0xff, 0xff]); // property value
        buf[24..28].copy_from_slice(&FDT_BEGIN_NODE.to_be_bytes()); // child node
        buf[28..36].copy_from_slice(b"child\0\0\0"); // child name + padding
        buf[36..40].copy_from_slice(&FDT_END_NODE.to_be_bytes()); // child node end
        buf[40..44].copy_from_slice(&FDT_END_NODE.to_be_bytes()); // root node end
        buf[44..48].copy_from_slice(&FDT_END.to_be_bytes()); // block end

        let mut tree = empty_tree();
        read_structure(&buf, &strings, &mut tree).unwrap();
        let root = tree.root();
        assert_eq!(tree.get_property(root, "test").unwrap().value(), &[0xff, 0xff]);
        let child = tree.find_node_by_path("/child").unwrap();
        assert_eq!(tree.parent(child), Ok(Some(root)));
        assert_eq!(tree.struct_size(), 48);
        assert_eq!(tree.struct_size(), tree.measure_struct_size());
    }

    #[test]
    fn nops_are_dropped_from_size() {
        let mut buf = [0u8; 24];
        buf[0..4].copy_from_slice(&FDT_BEGIN_NODE.to_be_bytes());
        buf[8..12].copy_from_slice(&FDT_NOP.to_be_bytes());
        buf[12..16].copy_from_slice(&FDT_NOP.to_be_bytes());
        buf[16..20].copy_from_slice(&FDT_END_NODE.to_be_bytes());
        buf[20..24].copy_from_slice(&FDT_END.to_be_bytes());

        let mut tree = empty_tree();
        read_structure(&buf, &StringTable::new(), &mut tree).unwrap();
        assert_eq!(tree.struct_size(), 16);
    }

    #[test]
    fn unterminated_node_is_rejected() {
        let mut buf = [0u8; 12];
        buf[0..4].copy_from_slice(&FDT_BEGIN_NODE.to_be_bytes());
        buf[8..12].copy_from_slice(&FDT_END.to_be_bytes());

        let mut tree = empty_tree();
        assert_eq!(
            read_structure(&buf, &StringTable::new(), &mut tree),
            Err(StructureError::NoNodeEndToken)
        );
    }

    #[test]
    fn named_root_is_rejected() {
        let mut buf = [0u8; 20];
        buf[0..4].copy_from_slice(&FDT_BEGIN_NODE.to_be_bytes());
        buf[4..8].copy_from_slice(b"abc\0");
        buf[8..12].copy_from_slice(&FDT_END_NODE.to_be_bytes());
        buf[12..16].copy_from_slice(&FDT_END.to_be_bytes());

        let mut tree = empty_tree();
        assert_eq!(
            read_structure(&buf, &StringTable::new(), &mut tree),
            Err(StructureError::InvalidRootNodeName)
        );
    }

    #[test]
    fn property_name_must_resolve() {
        let mut buf = [0u8; 32];
        buf[0..4].copy_from_slice(&FDT_BEGIN_NODE.to_be_bytes());
        buf[8..12].copy_from_slice(&FDT_PROP.to_be_bytes());
        buf[12..16].copy_from_slice(&0u32.to_be_bytes());
        buf[16..20].copy_from_slice(&64u32.to_be_bytes()); // name offset past the strings block
        buf[20..24].copy_from_slice(&FDT_END_NODE.to_be_bytes());
        buf[24..28].copy_from_slice(&FDT_END.to_be_bytes());

        let mut tree = empty_tree();
        assert_eq!(
            read_structure(&buf, &StringTable::from_buffer(b"reg\0"), &mut tree),
            Err(StructureError::PropertyName {
                offset: 8,
                source: StringsError::OutOfBounds(64, 4)
            })
        );
    }
}
