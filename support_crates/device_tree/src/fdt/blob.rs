//! Handling of the DTB/FDT as a whole

use crate::fdt::reader::{read_structure, StructureError};
use crate::fdt::{
    FdtHeader, HeaderReadError, MemoryReservationBlock, MemoryReservationFormatError, PackError,
    StringTable,
};
use crate::tree::DeviceTree;
use thiserror_no_std::Error;

/// The error that can occur when opening a FDT
#[derive(Debug, Error, Eq, PartialEq)]
pub enum FdtError {
    /// The FDT header could not be parsed for a specific reason
    #[error("Could not parse the fdt header: {0}")]
    HeaderParseError(#[from] HeaderReadError),
    /// The memory reservation block could not be parsed for a specific reason
    #[error("Could not parse memory reservation block: {0}")]
    MemoryReservationError(#[from] MemoryReservationFormatError),
    /// The structure block could not be parsed for a specific reason
    #[error("Could not parse structure block: {0}")]
    StructureError(#[from] StructureError),
    /// The capacity is larger than the buffer that backs it
    #[error("A capacity of {capacity} bytes was requested but the buffer is only {buffer} bytes long")]
    CapacityExceedsBuffer { capacity: usize, buffer: usize },
    /// The tree that was read does not fit into the capacity even in its minimal encoding
    #[error("The device tree requires {size} bytes which exceeds the capacity of {capacity} bytes")]
    TreeExceedsCapacity { size: usize, capacity: usize },
}

/// A device tree blob that has been opened for editing.
///
/// The whole blob is read into an owned [`DeviceTree`] when opening it, so the underlying buffer is not modified
/// until [`pack`](FdtBlob::pack) is called.
#[derive(Debug)]
pub struct FdtBlob<'buf> {
    buf: &'buf mut [u8],
    header: FdtHeader,
    tree: DeviceTree,
}

impl<'buf> FdtBlob<'buf> {
    /// Open the blob stored at the start of `buf`.
    ///
    /// `capacity` is the number of bytes starting at the beginning of `buf` that the blob may occupy after edits.
    pub fn open(buf: &'buf mut [u8], capacity: usize) -> Result<Self, FdtError> {
        if capacity > buf.len() {
            return Err(FdtError::CapacityExceedsBuffer {
                capacity,
                buffer: buf.len(),
            });
        }

        let header = FdtHeader::read_from_buffer(buf)?;
        header.check_layout(capacity)?;

        let total_size = header.total_size as usize;
        let rsv_start = header.off_mem_rsvmap as usize;
        let reservations = MemoryReservationBlock::from_buffer(&buf[rsv_start..total_size])?;

        let strings_start = header.off_dt_strings as usize;
        let strings = StringTable::from_buffer(
            &buf[strings_start..strings_start + header.size_dt_strings as usize],
        );

        let mut tree = DeviceTree::from_parts(
            StringTable::new(),
            reservations.collect(),
            header.boot_cpuid_phys,
            capacity,
        );
        let struct_start = header.off_dt_struct as usize;
        read_structure(
            &buf[struct_start..struct_start + header.size_dt_struct as usize],
            &strings,
            &mut tree,
        )?;
        tree.strings = strings;

        if tree.size() > capacity {
            return Err(FdtError::TreeExceedsCapacity {
                size: tree.size(),
                capacity,
            });
        }

        log::debug!(
            "opened device tree blob of {:#x} bytes with {} nodes (capacity {:#x})",
            total_size,
            tree.node_count(),
            capacity
        );
        Ok(Self { buf, header, tree })
    }

    /// Open the blob that is located at `ptr`.
    ///
    /// # Safety
    /// The given pointer must be valid, 8-byte aligned and the backing memory must be readable and writable for
    /// `capacity` bytes after it.
    ///
    /// The underlying memory must also not be accessed through other means for as long as the resulting instance
    /// is used.
    pub unsafe fn open_raw(ptr: *mut u8, capacity: usize) -> Result<Self, FdtError> {
        let buf = core::slice::from_raw_parts_mut::<u8>(ptr, capacity);
        Self::open(buf, capacity)
    }

    /// The header of the blob as it was last read from or written to the buffer
    pub fn header(&self) -> &FdtHeader {
        &self.header
    }

    pub fn tree(&self) -> &DeviceTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut DeviceTree {
        &mut self.tree
    }

    /// Write the current state of the tree back into the buffer it was opened from and return the length of the
    /// resulting blob
    pub fn pack(&mut self) -> Result<usize, PackError> {
        self.header = self.tree.write_blob(self.buf)?;
        Ok(self.header.total_size as usize)
    }
}
