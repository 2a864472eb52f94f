use core::fmt;
use core::fmt::Write;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
mod pl011_print;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use pl011_print::BootWriter;

#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
mod host_print;

#[cfg(not(all(target_arch = "aarch64", target_os = "none")))]
pub use host_print::BootWriter;

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    let _ = BootWriter {}.write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::print::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
