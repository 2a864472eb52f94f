//! A logging implementation which prints to the boot console
use core::fmt::Write;

use crate::print::BootWriter;
use log::{Level, Log, Metadata, Record, SetLoggerError};

pub struct BootLogger {
    pub initial_log_level: Level,
}

impl BootLogger {
    pub const fn new(max_log_level: Level) -> BootLogger {
        BootLogger {
            initial_log_level: max_log_level,
        }
    }

    pub fn install(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self).map(|_| log::set_max_level(self.initial_log_level.to_level_filter()))
    }

    pub fn update_log_level(&'static self, level: Level) {
        log::set_max_level(level.to_level_filter());
    }
}

/// The short tag that precedes every line logged at `level`
pub const fn level_marker(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN ",
        Level::Info => "INFO ",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

impl Log for BootLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let _ = BootWriter {}.write_fmt(format_args!(
                "{}  {}: {}\n",
                level_marker(record.level()),
                record.target(),
                record.args(),
            ));
        }
    }

    fn flush(&self) {}
}
