use crate::fdt::tokens::read_be_u32;
use core::mem;
use thiserror_no_std::Error;

pub(crate) const HEADER_MAGIC: u32 = 0xd00dfeed;

/// The version of the format that is produced when packing a blob
pub const FDT_VERSION: u32 = 17;

/// The oldest version that blobs of [`FDT_VERSION`] are backwards compatible with
pub const FDT_LAST_COMP_VERSION: u32 = 16;

/// Errors that can occur when reading the FDT header
#[derive(Debug, Error, Eq, PartialEq)]
pub enum HeaderReadError {
    /// The provided buffer did not contain the required magic bytes at the start
    #[error("The provided buffer did not contain the required magic bytes at the start")]
    InvalidMagic,
    /// The provided buffer did not contain enough bytes to read a header from it
    #[error("The provided buffer did not contain enough bytes to read a header from it")]
    BufferTooSmall,
    /// The device tree blob is encoded using an unsupported version
    #[error("The device tree blob is encoded using version {0} (with last compatible version being {1}) which is not supported")]
    UnsupportedVersion(u32, u32),
    /// The device tree blob is not aligned to an 8-byte boundary
    #[error("The device tree blob is not aligned to an 8-byte boundary")]
    InvalidAlignment,
    /// The declared total size does not fit into the space that is available for the blob
    #[error("The device tree blob declares a total size of {0} bytes but only {1} bytes are available")]
    TotalSizeOutOfBounds(u32, usize),
    /// One of the blocks lies outside of the declared total size
    #[error("The {0} block is not contained in the device tree blob")]
    BlockOutOfBounds(&'static str),
}

/// The FDT-Header data structure present at the start of every device tree blob.
/// All the header fields are 32-bit integers, stored in big-endian format.
///
/// It is modelled according to the [Devicetree Specification Section 5.2](https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html#header).
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[repr(C)]
pub struct FdtHeader {
    /// This field shall contain the value 0xd00dfeed (big-endian).
    pub magic: u32,
    /// The total size in bytes of the blob including all blocks and any free space between or after them.
    pub total_size: u32,
    /// Offset in bytes of the structure block from the beginning of the header.
    pub off_dt_struct: u32,
    /// Offset in bytes of the strings block from the beginning of the header.
    pub off_dt_strings: u32,
    /// Offset in bytes of the memory reservation block from the beginning of the header.
    pub off_mem_rsvmap: u32,
    /// The version of the devicetree data structure.
    pub version: u32,
    /// The lowest version with which the used version is backwards compatible.
    pub last_comp_version: u32,
    /// The physical ID of the system's boot CPU.
    pub boot_cpuid_phys: u32,
    /// Length in bytes of the strings block.
    pub size_dt_strings: u32,
    /// Length in bytes of the structure block.
    pub size_dt_struct: u32,
}

impl FdtHeader {
    /// Size of the encoded header in bytes
    pub const SIZE: usize = mem::size_of::<FdtHeader>();

    /// Try to read a header from a provided buffer
    pub fn read_from_buffer(buf: &[u8]) -> Result<Self, HeaderReadError> {
        // check alignment
        if (buf.as_ptr() as usize) % 8 != 0 {
            return Err(HeaderReadError::InvalidAlignment);
        }
        if buf.len() < Self::SIZE {
            return Err(HeaderReadError::BufferTooSmall);
        }

        let mut words = [0u32; 10];
        for (i, word) in words.iter_mut().enumerate() {
            *word = read_be_u32(&buf[i * 4..]).ok_or(HeaderReadError::BufferTooSmall)?;
        }
        let [magic, total_size, off_dt_struct, off_dt_strings, off_mem_rsvmap, version, last_comp_version, boot_cpuid_phys, size_dt_strings, size_dt_struct] =
            words;

        if magic != HEADER_MAGIC {
            return Err(HeaderReadError::InvalidMagic);
        }
        // version 16 blobs do not carry size_dt_struct which is required to bound the structure block
        if version < FDT_VERSION || last_comp_version > FDT_VERSION {
            return Err(HeaderReadError::UnsupportedVersion(
                version,
                last_comp_version,
            ));
        }

        Ok(Self {
            magic,
            total_size,
            off_dt_struct,
            off_dt_strings,
            off_mem_rsvmap,
            version,
            last_comp_version,
            boot_cpuid_phys,
            size_dt_strings,
            size_dt_struct,
        })
    }

    /// Try to read a header from a provided memory location
    ///
    /// # Safety
    /// The given pointer must be valid and the backing memory must be readable for at least 40 bytes after it.
    pub unsafe fn from_ptr(ptr: *const u8) -> Result<Self, HeaderReadError> {
        let buf = core::slice::from_raw_parts::<u8>(ptr, Self::SIZE);
        Self::read_from_buffer(buf)
    }

    /// Verify that the blob described by this header fits into `available` bytes and that every block lies
    /// inside of the declared total size.
    pub fn check_layout(&self, available: usize) -> Result<(), HeaderReadError> {
        let total_size = self.total_size as usize;
        if total_size > available || total_size < Self::SIZE {
            return Err(HeaderReadError::TotalSizeOutOfBounds(
                self.total_size,
                available,
            ));
        }

        let contained = |offset: u32, size: u32| {
            (offset as usize) >= Self::SIZE
                && (offset as usize)
                    .checked_add(size as usize)
                    .is_some_and(|end| end <= total_size)
        };
        if !contained(self.off_mem_rsvmap, 16) {
            return Err(HeaderReadError::BlockOutOfBounds("memory reservation"));
        }
        if !contained(self.off_dt_struct, self.size_dt_struct) {
            return Err(HeaderReadError::BlockOutOfBounds("structure"));
        }
        if !contained(self.off_dt_strings, self.size_dt_strings) {
            return Err(HeaderReadError::BlockOutOfBounds("strings"));
        }
        Ok(())
    }

    /// Encode this header in its big-endian on-disk format
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let words = [
            self.magic,
            self.total_size,
            self.off_dt_struct,
            self.off_dt_strings,
            self.off_mem_rsvmap,
            self.version,
            self.last_comp_version,
            self.boot_cpuid_phys,
            self.size_dt_strings,
            self.size_dt_struct,
        ];
        let mut bytes = [0u8; Self::SIZE];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        bytes
    }
}
