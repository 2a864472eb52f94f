//! Flattened Device Tree (also called Device-Tree-Blob) handling
//!
//! The DTB format encodes the devicetree data within a single, linear, pointerless data structure.
//! It consists of a small header (see [Devicetree Specification Section 5.2](https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html#sect-fdt-structure-block)),
//! followed by three variable sized sections:
//!
//! - the memory reservation block (see [Devicetree Specification Section 5.3](https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html#sect-fdt-memory-reservation-block)),
//! - the structure block (see [Devicetree Specification Section 5.4](https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html#sect-fdt-structure-block)),
//! - and the strings block (see [Devicetree Specification Section 5.5](https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html#sect-fdt-strings-block)).
//!
//! A blob that is read may contain free space between the blocks.
//! Packing always produces the compact layout below, with every block directly following the previous one:
//! ```text
//! ┌──────────────────────────┐ 0
//! │ struct FdtHeader         │
//! ├──────────────────────────┤ 40
//! │ memory reservation block │
//! ├──────────────────────────┤ 40 + 16 * (reservations + 1)
//! │ structure block          │
//! ├──────────────────────────┤
//! │ strings block            │
//! └──────────────────────────┘ total_size
//! ```
//!
//! # Example
//!
//! Open a blob, add a node and write it back
//!
//! ```rust
//! # use device_tree::fdt::FdtBlob;
//! # use device_tree::tree::DeviceTree;
//! # #[repr(C, align(8))]
//! # struct AlignedBuffer([u8; 0x200]);
//! # let mut buf = AlignedBuffer([0; 0x200]);
//! # DeviceTree::new(0x200).unwrap().pack_into(&mut buf.0).unwrap();
//! let mut blob = FdtBlob::open(&mut buf.0, 0x200).unwrap();
//! let tree = blob.tree_mut();
//! let chosen = tree.add_child(tree.root(), "chosen").unwrap();
//! tree.set_property_string(chosen, "bootargs", "console=ttyAMA0").unwrap();
//! let len = blob.pack().unwrap();
//! assert_eq!(len, blob.tree().size());
//! ```

mod blob;
mod header;
pub(crate) mod memory_reservation;
mod reader;
mod strings;
pub(crate) mod tokens;
mod writer;

pub use blob::{FdtBlob, FdtError};
pub use header::{FdtHeader, HeaderReadError, FDT_LAST_COMP_VERSION, FDT_VERSION};
pub use memory_reservation::{
    MemoryReservationBlock, MemoryReservationEntry, MemoryReservationFormatError,
};
pub use reader::StructureError;
pub use strings::{StringTable, StringsError};
pub use writer::PackError;
