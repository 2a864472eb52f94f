//! Console output on hosted targets, used when running tests
use core::fmt;
use core::fmt::Write;
use std::io::Write as _;

/// Dummy struct that makes converting [`fmt::Arguments`] easier to convert to strings
/// by offloading that to the [`Write`] trait.
pub struct BootWriter {}

impl Write for BootWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        std::io::stderr()
            .write_all(s.as_bytes())
            .map_err(|_| fmt::Error)
    }
}
