//! Host-side driver for STMicro's STLink v2 USB debug dongle.
//!
//! The dongle frames a vendor command protocol over two bulk endpoints;
//! everything else (halting the core, poking registers, reading memory,
//! programming flash) is built on top of that. Flash writes are the
//! interesting part: the dongle cannot emit the 16-bit bus cycles the
//! flash controller wants, so a tiny Thumb stub is staged into target SRAM
//! together with its parameters and data and run until it halts on a
//! breakpoint.
//!
//! ```no_run
//! use stlink_flash::{Flasher, STLink};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut probe = STLink::open()?;
//! probe.kick_mode()?;
//! let chip = probe.identify_chip()?;
//!
//! let firmware = std::fs::read("firmware.bin")?;
//! let mut flasher = Flasher::new(&mut probe);
//! flasher.erase_all()?;
//! flasher.write(chip.flash_base, &firmware)?;
//! flasher.verify(chip.flash_base, &firmware)?;
//! # Ok(())
//! # }
//! ```

pub mod chips;
pub mod constants;
pub mod flash;
mod stlink;
mod usb_interface;

pub use crate::chips::{ChipFamily, ChipParams, CHIP_TABLE};
pub use crate::constants::{CoreState, Mode};
pub use crate::flash::{FlashError, Flasher, MASS_ERASE};
pub use crate::stlink::{
    BreakpointKind, CoreRegisters, STLink, StLinkVersion, StlinkError, REG_PC,
};
pub use crate::usb_interface::{STLinkUSBDevice, StLinkUsb};
