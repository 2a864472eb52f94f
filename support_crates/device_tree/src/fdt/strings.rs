//! Handling of the *strings* block
//!
//! This is implemented according to [Devicetree Specification Section 5.5](https://devicetree-specification.readthedocs.io/en/v0.3/flattened-format.html#strings-block).
//!
//! The table is append-only: names are never removed, even when the last property using them is deleted.
//! Keeping existing offsets stable is what allows an unmodified tree to be packed byte-identically.

use alloc::vec::Vec;
use core::ffi::CStr;
use thiserror_no_std::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum StringsError {
    #[error("No string could be found at offset {0} in buffer of size {1}")]
    OutOfBounds(usize, usize),
    #[error("There was data at offset {0} but it was not zero-terminated")]
    Unterminated(usize),
    #[error("The string at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),
}

/// An owned strings block holding zero-terminated property names
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct StringTable {
    buf: Vec<u8>,
}

impl StringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy an existing strings block
    pub fn from_buffer(buf: &[u8]) -> Self {
        Self { buf: buf.to_vec() }
    }

    pub fn get_string(&self, offset: usize) -> Result<&str, StringsError> {
        let tail = self
            .buf
            .get(offset..)
            .ok_or(StringsError::OutOfBounds(offset, self.buf.len()))?;
        let s = CStr::from_bytes_until_nul(tail).map_err(|_| StringsError::Unterminated(offset))?;
        s.to_str().map_err(|_| StringsError::InvalidUtf8(offset))
    }

    /// Look up the offset of an entry which is exactly `name`
    pub fn find(&self, name: &str) -> Option<u32> {
        let mut offset = 0;
        for entry in self.buf.split(|b| *b == 0) {
            if entry == name.as_bytes() && offset + entry.len() < self.buf.len() {
                return Some(offset as u32);
            }
            offset += entry.len() + 1;
        }
        None
    }

    /// How many bytes the table would grow by when interning `name`
    pub fn growth_for(&self, name: &str) -> usize {
        match self.find(name) {
            Some(_) => 0,
            None => name.len() + 1,
        }
    }

    /// Return the offset of `name`, appending it to the table if it is not yet present
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(offset) = self.find(name) {
            return offset;
        }
        let offset = self.buf.len() as u32;
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.push(0);
        offset
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}
