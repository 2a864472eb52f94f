//! Console output through the PL011 UART of the QEMU `virt` machine
use core::fmt;
use core::fmt::Write;
use core::ptr::{read_volatile, write_volatile};

/// Base address of the UART that the previous boot stage already configured
const UART_BASE: usize = 0x0900_0000;
/// Offset (in bytes) to the data register
const DR_OFFSET: usize = 0x00;
/// Offset (in bytes) to the flag register
const FR_OFFSET: usize = 0x18;
/// Transmit FIFO full
const FR_TXFF: u32 = 1 << 5;

/// Dummy struct that makes converting [`fmt::Arguments`] easier to convert to strings
/// by offloading that to the [`Write`] trait.
pub struct BootWriter {}

impl BootWriter {
    fn put_byte(&mut self, byte: u8) {
        let dr = (UART_BASE + DR_OFFSET) as *mut u32;
        let fr = (UART_BASE + FR_OFFSET) as *const u32;
        unsafe {
            while read_volatile(fr) & FR_TXFF != 0 {
                core::hint::spin_loop();
            }
            write_volatile(dr, byte as u32);
        }
    }
}

impl Write for BootWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.put_byte(b'\r');
            }
            self.put_byte(byte);
        }
        Ok(())
    }
}
