//! Arguments that the next boot stages receive on entry
//!
//! After the fixups ran, the images that consume the device tree have to learn where it is. Which register carries
//! the address depends on the image.

use crate::{BootConfig, Dispatcher, NextImage};

/// The images whose entry arguments are prepared here
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ImageId {
    /// The secure payload
    Bl32,
    /// The normal world payload
    Bl33,
}

/// Values of the first four general purpose registers when an image is entered
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct EntryPointArgs {
    pub arg0: u64,
    pub arg1: u64,
    pub arg2: u64,
    pub arg3: u64,
}

impl EntryPointArgs {
    /// Fill in the arguments `image` expects under `config`.
    ///
    /// `mpidr` is the affinity register of the boot cpu. Arguments that the image does not take from this stage are
    /// left as they are.
    pub fn prepare(&mut self, image: ImageId, config: &BootConfig, mpidr: u64) {
        let fdt_addr = config.fdt_addr as u64;
        match (image, config.bl33) {
            (ImageId::Bl32, _) => {
                if config.dispatcher == Dispatcher::Opteed {
                    // the dispatcher moves it into x2
                    self.arg3 = fdt_addr;
                }
            }
            (ImageId::Bl33, NextImage::Linux) => {
                // x1-x3 are reserved and must be zero
                *self = Self {
                    arg0: fdt_addr,
                    ..Self::default()
                };
            }
            (ImageId::Bl33, NextImage::Firmware) => {
                self.arg0 = mpidr & 0xffff;
            }
        }
        log::debug!("entry arguments of {:?}: {:x?}", image, self);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const PRELOADED: EntryPointArgs = EntryPointArgs {
        arg0: 1,
        arg1: 2,
        arg2: 3,
        arg3: 4,
    };

    #[test]
    fn opteed_receives_fdt_in_fourth_argument() {
        let config = BootConfig {
            dispatcher: Dispatcher::Opteed,
            ..BootConfig::default()
        };
        let mut args = PRELOADED;
        args.prepare(ImageId::Bl32, &config, 0);
        assert_eq!(
            args,
            EntryPointArgs {
                arg3: 0x4000_0000,
                ..PRELOADED
            }
        );
    }

    #[test]
    fn other_secure_payloads_are_left_alone() {
        let config = BootConfig {
            dispatcher: Dispatcher::Trusty,
            ..BootConfig::default()
        };
        let mut args = PRELOADED;
        args.prepare(ImageId::Bl32, &config, 0);
        assert_eq!(args, PRELOADED);
    }

    #[test]
    fn linux_receives_fdt_and_zeros() {
        let config = BootConfig {
            bl33: NextImage::Linux,
            fdt_addr: 0x4800_0000,
            ..BootConfig::default()
        };
        let mut args = PRELOADED;
        args.prepare(ImageId::Bl33, &config, 0x8000_0102);
        assert_eq!(
            args,
            EntryPointArgs {
                arg0: 0x4800_0000,
                ..EntryPointArgs::default()
            }
        );
    }

    #[test]
    fn firmware_receives_boot_cpu() {
        let mut args = PRELOADED;
        args.prepare(ImageId::Bl33, &BootConfig::default(), 0x8100_0102);
        assert_eq!(
            args,
            EntryPointArgs {
                arg0: 0x0102,
                ..PRELOADED
            }
        );
    }
}
