//! Tokens of the structure block and a cursor for reading them
//!
//! This is according to [Devicetree Specification Section 5.4](https://devicetree-specification.readthedocs.io/en/v0.3/flattened-format.html#structure-block).
//! The structure block is a linear sequence of big-endian 32-bit tokens, each optionally followed by extra data
//! which is padded with zero bytes up to the next 4-byte boundary.

use core::ffi::CStr;
use core::mem;

/// Marks the beginning of a node. Followed by the node's unit name as a zero-terminated, padded string.
pub(crate) const FDT_BEGIN_NODE: u32 = 0x00000001;

/// Marks the end of a node. Has no extra data.
pub(crate) const FDT_END_NODE: u32 = 0x00000002;

/// Marks a property. Followed by the value length, the name offset into the strings block and the padded value.
pub(crate) const FDT_PROP: u32 = 0x00000003;

/// Ignored by any program parsing the device tree.
pub(crate) const FDT_NOP: u32 = 0x00000004;

/// Marks the end of the structure block. There is only one and it is the last token.
pub(crate) const FDT_END: u32 = 0x00000009;

/// Size of a single token in bytes
pub(crate) const TOKEN_SIZE: usize = mem::size_of::<u32>();

/// Size of the fixed part of a property (`FDT_PROP`, value length, name offset)
pub(crate) const PROP_HEADER_SIZE: usize = 3 * TOKEN_SIZE;

/// Align a number (typically a buffer index) so that it can be used to access aligned FDT tokens
#[inline]
pub(crate) const fn align_to_token(n: usize) -> usize {
    const ALIGNMENT: usize = mem::align_of::<u32>();
    (n + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

/// Read a big-endian `u32` from the start of `buf`
#[inline]
pub(crate) fn read_be_u32(buf: &[u8]) -> Option<u32> {
    let bytes = buf.get(0..TOKEN_SIZE)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// A forward-only reader over the tokens of a structure block.
///
/// Every read is bounds checked and yields `None` once the underlying buffer is exhausted.
#[derive(Debug, Clone)]
pub(crate) struct TokenCursor<'buf> {
    buf: &'buf [u8],
    pos: usize,
}

impl<'buf> TokenCursor<'buf> {
    pub fn new(buf: &'buf [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// The offset of the next unread byte, relative to the start of the structure block
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Read one 32-bit word and advance past it
    pub fn read_u32(&mut self) -> Option<u32> {
        let value = read_be_u32(self.buf.get(self.pos..)?)?;
        self.pos += TOKEN_SIZE;
        Some(value)
    }

    /// Read the next token, skipping over any `FDT_NOP` tokens
    pub fn next_token(&mut self) -> Option<u32> {
        loop {
            match self.read_u32()? {
                FDT_NOP => continue,
                token => return Some(token),
            }
        }
    }

    /// Read a zero-terminated string and advance to the next token boundary after it
    pub fn read_cstr(&mut self) -> Option<&'buf CStr> {
        let s = CStr::from_bytes_until_nul(self.buf.get(self.pos..)?).ok()?;
        self.pos = align_to_token(self.pos + s.to_bytes_with_nul().len());
        Some(s)
    }

    /// Read `len` bytes and advance to the next token boundary after them
    pub fn read_bytes(&mut self, len: usize) -> Option<&'buf [u8]> {
        let bytes = self.buf.get(self.pos..self.pos.checked_add(len)?)?;
        self.pos = align_to_token(self.pos + len);
        Some(bytes)
    }
}
