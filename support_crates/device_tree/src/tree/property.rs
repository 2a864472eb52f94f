//! Properties of editable nodes

use alloc::string::String;
use alloc::vec::Vec;
use core::str;

/// A single property of a node.
///
/// The value is an opaque byte array. Helpers are provided to interpret it in the common encodings
/// (zero-terminated strings, string lists and big-endian 32-bit cells).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Property {
    pub(crate) name: String,
    /// Offset of the name inside the strings block
    pub(crate) name_offset: u32,
    pub(crate) value: Vec<u8>,
}

impl Property {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Interpret the value as a string, stopping at the first zero byte like C string functions do
    pub fn as_str(&self) -> Option<&str> {
        let end = self
            .value
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(self.value.len());
        str::from_utf8(&self.value[..end]).ok()
    }

    /// Interpret the value as a single big-endian 32-bit cell
    pub fn as_u32(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.value.as_slice().try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    /// Iterate over the value as big-endian 32-bit cells. Trailing bytes which do not form a full cell are ignored.
    pub fn cells(&self) -> impl Iterator<Item = u32> + '_ {
        self.value
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
    }

    /// Iterate over the value as a list of zero-terminated strings
    pub fn strings(&self) -> impl Iterator<Item = &str> + '_ {
        let value = match self.value.last() {
            Some(0) => &self.value[..self.value.len() - 1],
            _ => &self.value[..],
        };
        value
            .split(|b| *b == 0)
            .filter(|_| !self.value.is_empty())
            .filter_map(|s| str::from_utf8(s).ok())
    }

    /// Whether the value is a string list containing `s`
    pub fn contains_string(&self, s: &str) -> bool {
        self.strings().any(|entry| entry == s)
    }
}

/// Encode a list of cells in the big-endian format used by property values
pub fn cells_to_bytes(cells: &[u32]) -> Vec<u8> {
    cells.iter().flat_map(|c| c.to_be_bytes()).collect()
}
