//! Device tree fixups of the second boot stage
//!
//! The blob that the platform preloaded is opened, edited by an ordered list of [`Fixup`]s and packed back into the
//! same buffer before its address is handed to the next boot stage (see [`handoff`]).
//!
//! The usual entry point is [`update_dt`], or [`update_dt_at`] for a blob at its physical address:
//!
//! ```rust,ignore
//! static LOGGER: bootlog::BootLogger = bootlog::BootLogger::new(log::Level::Info);
//!
//! LOGGER.install()?;
//! let config = BootConfig::from_args(unsafe { BootArgIter::from_argc_argv(argc, argv) })?;
//! LOGGER.update_log_level(config.log_level);
//! if let Err(failure) = unsafe { dt_fixup::update_dt_at(&config) } {
//!     // boot continues with the unmodified blob
//! }
//! ```
#![no_std]

extern crate alloc;

pub mod config;
mod error;
mod fixup;
pub mod handoff;
pub mod pipeline;
pub mod psci;
pub mod secure_mem;
pub mod spd;

pub use config::{BootConfig, ConfigError, Dispatcher, FixupSet, NextImage, PsciConvention};
pub use error::FixupError;
pub use fixup::{Fixup, Stage};
pub use pipeline::{update_dt, update_dt_at, Pipeline, PipelineFailure};
