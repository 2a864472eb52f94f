use alloc::vec::Vec;
use core::mem;
use thiserror_no_std::Error;

/// Size of one encoded entry of the memory reservation block
pub(crate) const ENTRY_SIZE: usize = mem::size_of::<u64>() * 2;

/// A single entry of the memory reservation block.
///
/// Each entry gives the physical address and size in bytes of a reserved memory region.
/// These given regions are required to not overlap each other.
/// The list of reserved blocks shall be terminated with an entry where both address and size are equal to 0.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct MemoryReservationEntry {
    /// The address at which the memory reservation starts
    pub address: u64,
    /// The length in bytes of the memory reservation
    pub size: u64,
}

impl MemoryReservationEntry {
    /// Create a new memory reservation entry
    pub fn new(address: u64, size: u64) -> Self {
        Self { address, size }
    }

    fn to_bytes(self) -> [u8; ENTRY_SIZE] {
        let mut bytes = [0u8; ENTRY_SIZE];
        bytes[..8].copy_from_slice(&self.address.to_be_bytes());
        bytes[8..].copy_from_slice(&self.size.to_be_bytes());
        bytes
    }
}

/// The error which indicates that a block of memory has an invalid format to be a valid memory allocation block
#[derive(Debug, Error, Eq, PartialEq)]
pub enum MemoryReservationFormatError {
    /// The memory reservation block is not aligned to an 8-byte boundary
    #[error("The memory reservation block is not aligned to an 8-byte boundary")]
    InvalidAlignment,
    /// The memory reservation block is smaller than 16 bytes
    #[error("The memory reservation block is smaller than 16 bytes")]
    BufferTooSmall,
    /// The memory reservation block does not contain a proper terminator
    #[error("The memory reservation block does not contain a proper terminator")]
    NoTerminator,
}

/// Description of memory areas that are *reserved* and should not be used for general memory allocations.
///
/// For details see [Devicetree Specification Section 5.3](https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html#memory-reservation-block).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MemoryReservationBlock<'buf> {
    buf: Option<&'buf [u8]>,
}

impl<'buf> MemoryReservationBlock<'buf> {
    /// Parse a new memory reservation block from an underlying buffer
    pub(crate) fn from_buffer(buf: &'buf [u8]) -> Result<Self, MemoryReservationFormatError> {
        if buf.as_ptr() as usize % 8 != 0 {
            return Err(MemoryReservationFormatError::InvalidAlignment);
        }
        if buf.len() < ENTRY_SIZE {
            return Err(MemoryReservationFormatError::BufferTooSmall);
        }

        // the terminator must be part of the buffer, otherwise the block is cut off
        let num_entries = Self { buf: Some(buf) }.count() + 1;
        let buf = buf
            .get(0..ENTRY_SIZE * num_entries)
            .ok_or(MemoryReservationFormatError::NoTerminator)?;

        Ok(Self { buf: Some(buf) })
    }

    /// Size in bytes that `entries` occupy when encoded, including the terminator
    pub(crate) fn encoded_size(entries: &[MemoryReservationEntry]) -> usize {
        ENTRY_SIZE * (entries.len() + 1)
    }

    /// Encode `entries` followed by the terminating entry
    pub(crate) fn encode(entries: &[MemoryReservationEntry]) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::encoded_size(entries));
        for entry in entries {
            out.extend_from_slice(&entry.to_bytes());
        }
        out.extend_from_slice(&[0u8; ENTRY_SIZE]);
        out
    }
}

impl<'buf> Iterator for MemoryReservationBlock<'buf> {
    type Item = MemoryReservationEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let buf = self.buf?;
        let Some(entry) = buf.get(0..ENTRY_SIZE) else {
            self.buf = None;
            return None;
        };

        let mut addr = [0u8; 8];
        let mut size = [0u8; 8];
        addr.copy_from_slice(&entry[..8]);
        size.copy_from_slice(&entry[8..]);
        let addr = u64::from_be_bytes(addr);
        let size = u64::from_be_bytes(size);

        // if this entry is the specified terminator, finish iteration
        if addr == 0 && size == 0 {
            self.buf = None;
            return None;
        }
        self.buf = buf.get(ENTRY_SIZE..);

        Some(MemoryReservationEntry {
            address: addr,
            size,
        })
    }
}
