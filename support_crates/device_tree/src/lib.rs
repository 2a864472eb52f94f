//! Library for reading, editing and writing [Device Tree](https://devicetree-specification.readthedocs.io/en/latest/index.html) data in their flattened encoding format ([fdt/dtb](https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html))
//!
//! [`fdt::FdtBlob`] opens a blob in a fixed-size buffer and exposes its content as an editable [`tree::DeviceTree`].
#![no_std]

extern crate alloc;

pub mod fdt;
pub mod tree;
