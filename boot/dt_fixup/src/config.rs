//! Boot configuration handling
//!
//! The previous boot stage passes parameters as a list of `key=value` strings, either as an *argc*, *argv* pair or
//! as a single space-separated command line.
//! The code in this module parses the parameters that are relevant for device tree fixups from those.

use alloc::string::{String, ToString};
use bitflags::bitflags;
use core::ffi::CStr;
use core::str::FromStr;
use log::Level;
use thiserror_no_std::Error;

/// Physical address at which QEMU places the device tree blob
pub const DEFAULT_FDT_ADDR: usize = 0x4000_0000;

/// Maximum size the device tree blob may grow to
pub const DEFAULT_FDT_MAX_SIZE: usize = 0x10_0000;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    #[error("The value {value:?} of {key}= is not a base 16 number")]
    InvalidNumber { key: &'static str, value: String },
    #[error("The value {value:?} is not supported for {key}=")]
    InvalidValue { key: &'static str, value: String },
    #[error("There is no fixup named {0:?}")]
    UnknownFixup(String),
}

/// The secure payload dispatcher that runs alongside the next boot stages
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Dispatcher {
    None,
    /// Trusty, which needs interrupt routing information in the device tree
    Trusty,
    /// OP-TEE, which receives the device tree address on entry
    Opteed,
}

/// The kind of image that is started as the normal world payload (BL33)
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NextImage {
    /// A Linux kernel which expects the device tree address in its first argument
    Linux,
    /// Firmware such as U-Boot which expects the id of the boot cpu
    Firmware,
}

/// Calling convention of the PSCI function ids that are advertised in the device tree
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PsciConvention {
    Smc64,
    Smc32,
}

bitflags! {
    /// The set of fixups that should be applied
    #[derive(Debug, Copy, Clone, Eq, PartialEq)]
    pub struct FixupSet: u32 {
        /// Remove memory nodes that are reserved for the secure world
        const SECURE_MEM = 1 << 0;
        /// Add a `/psci` node
        const PSCI_NODE = 1 << 1;
        /// Set the `enable-method` of all cpus to `psci`
        const CPU_ENABLE_METHODS = 1 << 2;
        /// Add the interrupt routing subtree of the configured dispatcher
        const DISPATCHER = 1 << 3;
    }
}

impl FixupSet {
    fn from_fixup_name(name: &str) -> Option<Self> {
        match name {
            "secure-mem" => Some(Self::SECURE_MEM),
            "psci" => Some(Self::PSCI_NODE),
            "cpu-enable" => Some(Self::CPU_ENABLE_METHODS),
            "spd" => Some(Self::DISPATCHER),
            "all" => Some(Self::all()),
            "none" => Some(Self::empty()),
            _ => None,
        }
    }
}

/// Configuration of the device tree fixups packed into a struct
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootConfig {
    /// The address of the *flattened device tree* in physical memory
    pub fdt_addr: usize,
    /// The number of bytes at `fdt_addr` that the blob may occupy
    pub fdt_max_size: usize,
    pub dispatcher: Dispatcher,
    pub bl33: NextImage,
    pub psci: PsciConvention,
    /// Fixups that are enabled. The dispatcher fixup additionally requires a dispatcher that needs it.
    pub fixups: FixupSet,
    /// maximum log level that should be emitted
    pub log_level: Level,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            fdt_addr: DEFAULT_FDT_ADDR,
            fdt_max_size: DEFAULT_FDT_MAX_SIZE,
            dispatcher: Dispatcher::None,
            bl33: NextImage::Firmware,
            psci: PsciConvention::Smc64,
            fixups: FixupSet::all(),
            log_level: Level::Info,
        }
    }
}

fn parse_hex(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    usize::from_str_radix(digits, 16).map_err(|_| ConfigError::InvalidNumber {
        key,
        value: value.to_string(),
    })
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    }
}

impl BootConfig {
    /// Parse a `BootConfig` from an iterator over raw `key=value` arguments.
    ///
    /// Arguments that are not understood are ignored so that parameters meant for later boot stages can be passed
    /// through the same list.
    pub fn from_args<'a>(args: impl IntoIterator<Item = &'a str>) -> Result<Self, ConfigError> {
        log::trace!("parsing boot parameters");
        let mut config = Self::default();

        for arg in args {
            let Some((key, value)) = arg.split_once('=') else {
                log::warn!("ignoring boot parameter {:?} without value", arg);
                continue;
            };
            match key {
                "fdt_addr" => config.fdt_addr = parse_hex("fdt_addr", value)?,
                "fdt_max_size" => config.fdt_max_size = parse_hex("fdt_max_size", value)?,
                "spd" => {
                    config.dispatcher = match value {
                        "none" => Dispatcher::None,
                        "trusty" => Dispatcher::Trusty,
                        "opteed" => Dispatcher::Opteed,
                        _ => return Err(invalid("spd", value)),
                    }
                }
                "bl33" => {
                    config.bl33 = match value {
                        "linux" => NextImage::Linux,
                        "firmware" => NextImage::Firmware,
                        _ => return Err(invalid("bl33", value)),
                    }
                }
                "psci" => {
                    config.psci = match value {
                        "smc64" => PsciConvention::Smc64,
                        "smc32" => PsciConvention::Smc32,
                        _ => return Err(invalid("psci", value)),
                    }
                }
                "fixups" => {
                    let mut fixups = FixupSet::empty();
                    for name in value.split(',').filter(|n| !n.is_empty()) {
                        fixups |= FixupSet::from_fixup_name(name)
                            .ok_or_else(|| ConfigError::UnknownFixup(name.to_string()))?;
                    }
                    config.fixups = fixups;
                }
                "log-level" => {
                    config.log_level =
                        Level::from_str(value).map_err(|_| invalid("log-level", value))?
                }
                _ => log::warn!("ignoring unknown boot parameter {:?}", key),
            }
        }

        Ok(config)
    }

    /// Parse a `BootConfig` from a space-separated command line
    pub fn from_cmdline(cmdline: &str) -> Result<Self, ConfigError> {
        Self::from_args(cmdline.split_whitespace())
    }

    /// Whether the dispatcher routing subtree should be added to the device tree
    pub fn annotate_dispatcher(&self) -> bool {
        self.dispatcher == Dispatcher::Trusty && self.fixups.contains(FixupSet::DISPATCHER)
    }
}

/// An iterator over an *argc*, *argv* pair.
///
/// This is a typical c-style pattern for passing a list of argument strings.
/// It works like this:
///
/// - `argc` describes how many arguments are passed (think `argc = argument_count`)
/// - `argv` points to the start of an array of pointers to those arguments.
///   Each argument is expected to be a null-terminated string (CStr) and the array items point to the start of each arguments string.
///
/// Arguments which are not valid UTF-8 are skipped.
pub struct BootArgIter {
    argc: u32,
    current: u32,
    argv: *const *const core::ffi::c_char,
}

impl BootArgIter {
    /// Create a new iterator from the given `argc`, `argv` pair
    ///
    /// # Safety
    /// `argv` must point to `argc` valid pointers to null-terminated strings that live for the rest of the boot stage.
    pub unsafe fn from_argc_argv(argc: u32, argv: *const *const core::ffi::c_char) -> Self {
        BootArgIter {
            argc,
            argv,
            current: 0,
        }
    }
}

impl Iterator for BootArgIter {
    type Item = &'static str;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current < self.argc {
            let current = self.current;
            self.current += 1;
            let cs = unsafe { CStr::from_ptr(*self.argv.add(current as usize)) };
            match cs.to_str() {
                Ok(s) => return Some(s),
                Err(_) => log::warn!("skipping boot parameter {} which is not valid UTF-8", current),
            }
        }
        None
    }
}
