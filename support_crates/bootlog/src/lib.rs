#![no_std]

#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
extern crate std;

#[macro_use]
pub mod print;
mod boot_logger;

pub use boot_logger::{level_marker, BootLogger};
pub use print::BootWriter;
