//! Serializing a [`DeviceTree`] into the flattened format

use crate::fdt::header::{FDT_LAST_COMP_VERSION, FDT_VERSION, HEADER_MAGIC};
use crate::fdt::tokens::{FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_PROP, TOKEN_SIZE};
use crate::fdt::{FdtHeader, MemoryReservationBlock};
use crate::tree::{DeviceTree, EditError, NodeId};
use alloc::vec;
use thiserror_no_std::Error;

/// Errors that can occur while writing a tree into a buffer
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PackError {
    /// The packed tree would not fit into the destination
    #[error("Packing requires {needed} bytes but only {capacity} bytes are available")]
    InsufficientCapacity { needed: usize, capacity: usize },
    /// The tree references a node that no longer exists
    #[error("The tree is inconsistent: {0}")]
    Inconsistent(#[from] EditError),
    /// Fewer or more bytes were written than the tree accounted for
    #[error("Expected to write {expected} bytes but wrote {written}")]
    SizeMismatch { expected: usize, written: usize },
}

/// A cursor which writes into a byte slice and never panics on overflow
struct SliceWriter<'buf> {
    buf: &'buf mut [u8],
    pos: usize,
}

impl<'buf> SliceWriter<'buf> {
    fn new(buf: &'buf mut [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), PackError> {
        let end = self.pos + bytes.len();
        let capacity = self.buf.len();
        let dst = self
            .buf
            .get_mut(self.pos..end)
            .ok_or(PackError::InsufficientCapacity {
                needed: end,
                capacity,
            })?;
        dst.copy_from_slice(bytes);
        self.pos = end;
        Ok(())
    }

    fn put_u32(&mut self, value: u32) -> Result<(), PackError> {
        self.put(&value.to_be_bytes())
    }

    /// Write `bytes` followed by zero padding up to the next token boundary
    fn put_padded(&mut self, bytes: &[u8]) -> Result<(), PackError> {
        self.put(bytes)?;
        let padding = (TOKEN_SIZE - self.pos % TOKEN_SIZE) % TOKEN_SIZE;
        self.put(&[0u8; TOKEN_SIZE][..padding])
    }
}

enum Step {
    Open(NodeId),
    Close,
}

fn write_structure(tree: &DeviceTree, w: &mut SliceWriter) -> Result<(), PackError> {
    let mut steps = vec![Step::Open(tree.root())];
    while let Some(step) = steps.pop() {
        let id = match step {
            Step::Close => {
                w.put_u32(FDT_END_NODE)?;
                continue;
            }
            Step::Open(id) => id,
        };

        let node = tree.node(id)?;
        w.put_u32(FDT_BEGIN_NODE)?;
        w.put(node.name().as_bytes())?;
        w.put_padded(&[0])?;
        for prop in node.properties() {
            w.put_u32(FDT_PROP)?;
            w.put_u32(prop.value.len() as u32)?;
            w.put_u32(prop.name_offset)?;
            w.put_padded(&prop.value)?;
        }

        steps.push(Step::Close);
        steps.extend(node.children().iter().rev().map(|c| Step::Open(*c)));
    }
    w.put_u32(FDT_END)
}

impl DeviceTree {
    /// Write the minimal serialization of this tree to the start of `buf` and return its length.
    ///
    /// The blocks are laid out back to back in the order header, memory reservations, structure, strings.
    /// Nothing is written if the tree does not fit into its capacity or into `buf`.
    pub fn pack_into(&self, buf: &mut [u8]) -> Result<usize, PackError> {
        self.write_blob(buf).map(|header| header.total_size as usize)
    }

    /// Like [`pack_into`](DeviceTree::pack_into) but returns the header that was written
    pub(crate) fn write_blob(&self, buf: &mut [u8]) -> Result<FdtHeader, PackError> {
        let needed = self.size();
        let capacity = self.capacity().min(buf.len());
        if needed > capacity {
            log::debug!(
                "cannot pack device tree of {:#x} bytes into {:#x} bytes",
                needed,
                capacity
            );
            return Err(PackError::InsufficientCapacity { needed, capacity });
        }

        let off_mem_rsvmap = FdtHeader::SIZE;
        let off_dt_struct = off_mem_rsvmap + MemoryReservationBlock::encoded_size(&self.reservations);
        let off_dt_strings = off_dt_struct + self.struct_size();
        let header = FdtHeader {
            magic: HEADER_MAGIC,
            total_size: needed as u32,
            off_dt_struct: off_dt_struct as u32,
            off_dt_strings: off_dt_strings as u32,
            off_mem_rsvmap: off_mem_rsvmap as u32,
            version: FDT_VERSION,
            last_comp_version: FDT_LAST_COMP_VERSION,
            boot_cpuid_phys: self.boot_cpuid_phys,
            size_dt_strings: self.strings.len() as u32,
            size_dt_struct: self.struct_size() as u32,
        };

        let mut w = SliceWriter::new(&mut buf[..needed], 0);
        w.put(&header.to_bytes())?;
        w.put(&MemoryReservationBlock::encode(&self.reservations))?;
        write_structure(self, &mut w)?;
        if w.pos != off_dt_strings {
            return Err(PackError::SizeMismatch {
                expected: off_dt_strings,
                written: w.pos,
            });
        }
        w.put(self.strings.as_bytes())?;

        log::debug!("packed device tree into {:#x} bytes", w.pos);
        Ok(header)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fdt::MemoryReservationEntry;

    #[repr(C, align(8))]
    pub struct AlignedBuffer<const LENGTH: usize>(pub [u8; LENGTH]);

    #[test]
    fn pack_empty_tree() {
        let tree = DeviceTree::new(0x100).unwrap();
        let mut buf = AlignedBuffer([0xaa; 0x100]);
        let len = tree.pack_into(&mut buf.0).unwrap();
        assert_eq!(len, 72);

        let header = FdtHeader::read_from_buffer(&buf.0).unwrap();
        assert_eq!(header.total_size, 72);
        assert_eq!(header.off_mem_rsvmap, 40);
        assert_eq!(header.off_dt_struct, 56);
        assert_eq!(header.size_dt_struct, 16);
        assert_eq!(header.off_dt_strings, 72);
        assert_eq!(header.size_dt_strings, 0);
        assert_eq!(&buf.0[40..56], &[0u8; 16]);
        assert_eq!(&buf.0[56..60], &FDT_BEGIN_NODE.to_be_bytes());
        assert_eq!(&buf.0[60..64], &[0u8; 4]);
        // bytes after the blob are left alone
        assert_eq!(buf.0[72], 0xaa);
    }

    #[test]
    fn pack_writes_reservations_and_padding() {
        let mut tree = DeviceTree::new(0x200).unwrap();
        let root = tree.root();
        tree.add_memory_reservation(MemoryReservationEntry::new(0xe000_0000, 0x100_0000))
            .unwrap();
        let chosen = tree.add_child(root, "chosen").unwrap();
        tree.set_property(chosen, "x", &[1, 2, 3]).unwrap();

        let mut buf = AlignedBuffer([0xaa; 0x200]);
        let len = tree.pack_into(&mut buf.0).unwrap();
        assert_eq!(len, tree.size());

        let header = FdtHeader::read_from_buffer(&buf.0).unwrap();
        let structure = header.off_dt_struct as usize;
        assert_eq!(structure, 40 + 32);
        assert_eq!(&buf.0[40..48], &0xe000_0000u64.to_be_bytes());
        // root, "chosen" node, property header and a value padded with zeros
        let value = structure + 8 + 12 + 12;
        assert_eq!(&buf.0[value..value + 4], &[1, 2, 3, 0]);
        assert_eq!(&buf.0[header.off_dt_strings as usize..len], b"x\0");
    }

    #[test]
    fn pack_refuses_small_buffer_without_writing() {
        let tree = DeviceTree::new(0x100).unwrap();
        let mut buf = AlignedBuffer([0xaa; 64]);
        assert_eq!(
            tree.pack_into(&mut buf.0),
            Err(PackError::InsufficientCapacity {
                needed: 72,
                capacity: 64
            })
        );
        assert_eq!(buf.0, [0xaa; 64]);
    }
}
