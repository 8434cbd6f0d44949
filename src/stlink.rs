//! The STLink session: command framing, mode kicking, core control, and
//! target memory access.

use std::fmt;
use std::thread;
use std::time::Duration;

use scroll::{Pread, Pwrite, BE, LE};
use thiserror::Error;

use crate::chips::{self, ChipParams, DBGMCU_IDCODE, DBGMCU_IDCODE_M0};
use crate::constants::{commands, CoreState, Mode, STATUS_OK};
use crate::usb_interface::{
    STLinkUSBDevice, StLinkUsb, DATA_BUF_LEN, TIMEOUT, USB_PID, USB_PID_V1, USB_VID,
};

/// Maximum bytes moved by a single ReadMem32 when iterating a large read.
const READ_BLOCK_SIZE: usize = 1024;

/// Maximum payload of a WriteMem8 command, one full-speed USB packet.
const WRITE8_MAX: usize = 64;

/// Attempts to reopen the dongle after a DFU exit before giving up.
const KICK_RETRIES: usize = 10;

/// Register index of the program counter in the STLink register file.
pub const REG_PC: u8 = 15;

#[derive(Error, Debug)]
pub enum StlinkError {
    #[error("USB transfer failed")]
    Usb(#[from] rusb::Error),
    #[error("no STLink v2 found on the USB bus")]
    ProbeNotFound,
    #[error("expected USB endpoint not present on the device")]
    EndpointNotFound,
    #[error("device reports VID/PID {vid:#06x}/{pid:#06x}, not an STLink")]
    DeviceMismatch { vid: u16, pid: u16 },
    #[error("STLink v1 dongles speak SCSI, not the bulk protocol; use a v2")]
    V1NotSupported,
    #[error("not enough bytes written: {is} of {should}")]
    NotEnoughBytesWritten { is: usize, should: usize },
    #[error("not enough bytes read: {is} of {should}")]
    NotEnoughBytesRead { is: usize, should: usize },
    #[error("command failed with status {0:#04x}")]
    CommandFailed(u8),
    #[error("unknown device mode {0:#06x}")]
    UnknownMode(u16),
    #[error("could not kick the STLink out of {0:?} mode")]
    ModeKickFailed(Mode),
    #[error("unaligned address or length for a word transfer")]
    DataAlignment,
    #[error("transfer of {0} bytes exceeds the data buffer")]
    TransferTooLong(usize),
}

/// The packed 6-byte version descriptor returned by GetVersion.
///
/// The version halfword is big-endian on the wire; the vendor and product
/// IDs that follow are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StLinkVersion {
    pub stlink: u8,
    pub jtag: u8,
    pub swim: u8,
    pub vid: u16,
    pub pid: u16,
}

impl StLinkVersion {
    pub fn parse(buf: &[u8; 6]) -> Self {
        let packed: u16 = (&buf[0..2]).pread_with(0, BE).unwrap();
        StLinkVersion {
            stlink: (packed >> 12) as u8 & 0x0f,
            jtag: (packed >> 6) as u8 & 0x3f,
            swim: packed as u8 & 0x3f,
            vid: (&buf[2..4]).pread_with(0, LE).unwrap(),
            pid: (&buf[4..6]).pread_with(0, LE).unwrap(),
        }
    }

    pub fn is_stlink(&self) -> bool {
        self.vid == USB_VID && (self.pid == USB_PID || self.pid == USB_PID_V1)
    }

    pub fn is_v2(&self) -> bool {
        self.pid == USB_PID
    }
}

impl fmt::Display for StLinkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "STLink {:#06x}/{:#06x}, versions STLink {:#x} JTAG {:#x} SWIM {:#x}",
            self.vid, self.pid, self.stlink, self.jtag, self.swim
        )
    }
}

/// The ARM core register file, in STLink transfer order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreRegisters {
    /// r0..r15, with r15 the program counter.
    pub r: [u32; 16],
    pub xpsr: u32,
    pub main_sp: u32,
    pub process_sp: u32,
    pub rw: u32,
    pub rw2: u32,
}

impl CoreRegisters {
    /// Unpacks the 84-byte ReadAllRegs response.
    fn parse(buf: &[u8; 84]) -> Self {
        let word = |idx: usize| -> u32 { (&buf[idx * 4..idx * 4 + 4]).pread_with(0, LE).unwrap() };
        let mut r = [0u32; 16];
        for (idx, reg) in r.iter_mut().enumerate() {
            *reg = word(idx);
        }
        CoreRegisters {
            r,
            xpsr: word(16),
            main_sp: word(17),
            process_sp: word(18),
            rw: word(19),
            rw2: word(20),
        }
    }
}

impl fmt::Display for CoreRegisters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, value) in self.r.iter().enumerate() {
            let sep = if idx % 4 == 3 { '\n' } else { ' ' };
            write!(f, "r{:02}=0x{:08x}{}", idx, value, sep)?;
        }
        writeln!(f, "xPSR       = 0x{:08x}", self.xpsr)?;
        writeln!(
            f,
            "main_sp    = 0x{:08x}  process_sp = 0x{:08x}",
            self.main_sp, self.process_sp
        )?;
        write!(
            f,
            "rw         = 0x{:08x}  rw2        = 0x{:08x}",
            self.rw, self.rw2
        )
    }
}

/// Which halfword of the matched address a flash-patch breakpoint covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakpointKind {
    Lower = 0x00,
    Upper = 0x01,
    Both = 0x02,
}

/// One attached STLink v2 dongle and the target behind it.
///
/// A session owns the USB handle exclusively; commands are strictly
/// sequential and every USB resource is released on drop.
#[derive(Debug)]
pub struct STLink<D: StLinkUsb> {
    device: D,
    version: Option<StLinkVersion>,
    core_state: CoreState,
    chip_index: usize,
    cpu_idcode: u32,
    flash_size_kb: Option<u32>,
}

impl STLink<STLinkUSBDevice> {
    /// Scans the USB bus, attaches to the first STLink v2 and verifies its
    /// identity.
    pub fn open() -> Result<Self, StlinkError> {
        let mut probe = STLink::new(STLinkUSBDevice::new()?);
        probe.init()?;
        Ok(probe)
    }
}

impl<D: StLinkUsb> Drop for STLink<D> {
    fn drop(&mut self) {
        // We ignore the error case as we can't do much about it anyways.
        let _ = self.exit_debug();
    }
}

impl<D: StLinkUsb> STLink<D> {
    /// Wraps an already-opened transport. Use [`STLink::open`] for real
    /// hardware.
    pub fn new(device: D) -> Self {
        Self {
            device,
            version: None,
            core_state: CoreState::Unknown,
            chip_index: 0,
            cpu_idcode: 0,
            flash_size_kb: None,
        }
    }

    /// Reads the version descriptor and enforces the identity invariant:
    /// the vendor must be STMicro and the dongle must speak the v2 bulk
    /// protocol.
    pub fn init(&mut self) -> Result<(), StlinkError> {
        let version = self.get_version()?;

        if version.vid == 0 && version.pid == 0 {
            // A freshly plugged dongle reports zeroes while it settles.
            return Err(StlinkError::DeviceMismatch { vid: 0, pid: 0 });
        }
        if !version.is_stlink() {
            return Err(StlinkError::DeviceMismatch {
                vid: version.vid,
                pid: version.pid,
            });
        }
        if !version.is_v2() {
            return Err(StlinkError::V1NotSupported);
        }

        log::debug!("{}", version);
        Ok(())
    }

    /// Reads and caches the dongle's packed version descriptor.
    pub fn get_version(&mut self) -> Result<StLinkVersion, StlinkError> {
        let mut buf = [0u8; 6];
        self.device
            .write(&[commands::GET_VERSION], &[], &mut buf, TIMEOUT)?;
        let version = StLinkVersion::parse(&buf);
        self.version = Some(version);
        Ok(version)
    }

    pub fn version(&self) -> Option<StLinkVersion> {
        self.version
    }

    pub fn get_current_mode(&mut self) -> Result<Mode, StlinkError> {
        let mut buf = [0u8; 2];
        self.device
            .write(&[commands::GET_CURRENT_MODE], &[], &mut buf, TIMEOUT)?;
        let code: u16 = (&buf[..]).pread_with(0, LE).unwrap();

        let mode = match code {
            0 => Mode::Dfu,
            1 => Mode::MassStorage,
            2 => Mode::Debug,
            3 => Mode::Swim,
            4 => Mode::Bootloader,
            other => return Err(StlinkError::UnknownMode(other)),
        };

        log::trace!("Current device mode: {:?}", mode);
        Ok(mode)
    }

    /// Commands the dongle to leave DFU mode. The device resets and drops
    /// off the bus afterwards.
    pub fn exit_dfu(&mut self) -> Result<(), StlinkError> {
        self.device.write(
            &[commands::DFU_COMMAND, commands::DFU_EXIT],
            &[],
            &mut [],
            TIMEOUT,
        )
    }

    /// Switches the target interface to SWD. Mode entry commands return no
    /// status.
    pub fn enter_swd(&mut self) -> Result<(), StlinkError> {
        self.device.write(
            &[
                commands::DEBUG_COMMAND,
                commands::DEBUG_ENTER_MODE,
                commands::DEBUG_ENTER_SWD,
            ],
            &[],
            &mut [],
            TIMEOUT,
        )
    }

    pub fn exit_debug(&mut self) -> Result<(), StlinkError> {
        self.device.write(
            &[commands::DEBUG_COMMAND, commands::DEBUG_EXIT],
            &[],
            &mut [],
            TIMEOUT,
        )
    }

    /// Reads the SWD core ID. The dongle expects this to be the first
    /// debug command after entering SWD.
    pub fn read_core_id(&mut self) -> Result<u32, StlinkError> {
        let mut buf = [0u8; 4];
        self.device.write(
            &[commands::DEBUG_COMMAND, commands::DEBUG_READ_CORE_ID],
            &[],
            &mut buf,
            TIMEOUT,
        )?;
        Ok((&buf[..]).pread_with(0, LE).unwrap())
    }

    /// Kicks the dongle into a workable mode.
    ///
    /// Debug and mass-storage modes are fine as found. Anything else is
    /// assumed to be DFU: exit it, then ride out the disconnect and
    /// re-enumeration with up to ten one-second retries. Transport errors
    /// during the retries are expected and swallowed.
    pub fn kick_mode(&mut self) -> Result<(), StlinkError> {
        let mode = self.get_current_mode()?;

        if mode != Mode::Debug && mode != Mode::MassStorage {
            log::warn!("STLink is in {:?} mode, attempting to switch it out...", mode);

            if let Err(e) = self.exit_dfu() {
                log::debug!("DFU exit reported {}; continuing with reopen.", e);
            }

            let mut recovered = false;
            for attempt in 1..=KICK_RETRIES {
                thread::sleep(Duration::from_secs(1));
                if let Err(e) = self.device.reopen() {
                    log::debug!("Reopen attempt {} failed: {}.", attempt, e);
                    continue;
                }
                if self.enter_swd().is_err() {
                    continue;
                }
                match self.get_status() {
                    Ok(CoreState::Running) | Ok(CoreState::Halted) => {
                        recovered = true;
                        break;
                    }
                    _ => continue,
                }
            }
            if !recovered {
                return Err(StlinkError::ModeKickFailed(mode));
            }
        }

        self.enter_swd()?;
        match self.get_current_mode()? {
            Mode::Debug => {}
            other => log::warn!(
                "Failed to switch the STLink into debug mode (still {:?}).",
                other
            ),
        }
        Ok(())
    }

    /// Queries and caches the execution state of the target core.
    pub fn get_status(&mut self) -> Result<CoreState, StlinkError> {
        let mut buf = [0u8; 2];
        self.device.write(
            &[commands::DEBUG_COMMAND, commands::DEBUG_GET_STATUS],
            &[],
            &mut buf,
            TIMEOUT,
        )?;
        self.core_state = CoreState::from_status(buf[0]);
        Ok(self.core_state)
    }

    pub fn core_state(&self) -> CoreState {
        self.core_state
    }

    /// Halts the core by forcing debug state.
    pub fn halt(&mut self) -> Result<(), StlinkError> {
        self.simple_command(commands::DEBUG_FORCE_DEBUG)
    }

    /// Resets the target system. The core stays under debug control.
    pub fn reset(&mut self) -> Result<(), StlinkError> {
        self.simple_command(commands::DEBUG_RESET_SYS)
    }

    pub fn run(&mut self) -> Result<(), StlinkError> {
        self.simple_command(commands::DEBUG_RUN_CORE)
    }

    pub fn step(&mut self) -> Result<(), StlinkError> {
        self.simple_command(commands::DEBUG_STEP_CORE)
    }

    /// A debug command carrying no parameters and returning the usual
    /// two-byte status.
    fn simple_command(&mut self, sub_command: u8) -> Result<(), StlinkError> {
        let mut buf = [0u8; 2];
        self.device.write(
            &[commands::DEBUG_COMMAND, sub_command],
            &[],
            &mut buf,
            TIMEOUT,
        )?;
        Self::check_status(&buf)
    }

    /// Validates a two-byte status response against OK.
    fn check_status(status: &[u8]) -> Result<(), StlinkError> {
        if status[0] != STATUS_OK {
            log::warn!("Command returned status {:#04x}.", status[0]);
            Err(StlinkError::CommandFailed(status[0]))
        } else {
            Ok(())
        }
    }

    /// Reads the whole register file as one 84-byte transfer. The core
    /// must be halted.
    pub fn read_all_regs(&mut self) -> Result<CoreRegisters, StlinkError> {
        let mut buf = [0u8; 84];
        self.device.write(
            &[commands::DEBUG_COMMAND, commands::DEBUG_READ_ALL_REGS],
            &[],
            &mut buf,
            TIMEOUT,
        )?;
        Ok(CoreRegisters::parse(&buf))
    }

    /// Reads a single register; see [`CoreRegisters`] for the index order.
    pub fn read_reg(&mut self, index: u8) -> Result<u32, StlinkError> {
        let mut buf = [0u8; 4];
        self.device.write(
            &[
                commands::DEBUG_COMMAND,
                commands::DEBUG_READ_ONE_REG,
                index,
            ],
            &[],
            &mut buf,
            TIMEOUT,
        )?;
        Ok((&buf[..]).pread_with(0, LE).unwrap())
    }

    pub fn write_reg(&mut self, index: u8, value: u32) -> Result<(), StlinkError> {
        let mut cmd = [0u8; 7];
        cmd[0] = commands::DEBUG_COMMAND;
        cmd[1] = commands::DEBUG_WRITE_REG;
        cmd[2] = index;
        cmd.pwrite_with(value, 3, LE).unwrap();

        let mut buf = [0u8; 2];
        self.device.write(&cmd, &[], &mut buf, TIMEOUT)?;
        Self::check_status(&buf)
    }

    /// Arms one of the four flash-patch comparators as a hardware
    /// breakpoint on `addr`.
    pub fn set_breakpoint(
        &mut self,
        slot: u8,
        addr: u32,
        kind: BreakpointKind,
    ) -> Result<(), StlinkError> {
        let mut cmd = [0u8; 8];
        cmd[0] = commands::DEBUG_COMMAND;
        cmd[1] = commands::DEBUG_SET_FP;
        cmd[2] = slot;
        cmd.pwrite_with(addr, 3, LE).unwrap();
        cmd[7] = kind as u8;

        let mut buf = [0u8; 2];
        self.device.write(&cmd, &[], &mut buf, TIMEOUT)?;
        Self::check_status(&buf)
    }

    pub fn clear_breakpoint(&mut self, slot: u8) -> Result<(), StlinkError> {
        let mut buf = [0u8; 2];
        self.device.write(
            &[commands::DEBUG_COMMAND, commands::DEBUG_CLEAR_FP, slot],
            &[],
            &mut buf,
            TIMEOUT,
        )?;
        Self::check_status(&buf)
    }

    /// Builds the 10-byte memory command frame shared by the three memory
    /// sub-commands.
    fn memory_command(sub_command: u8, addr: u32, len: u16) -> [u8; 10] {
        let mut cmd = [0u8; 10];
        cmd[0] = commands::DEBUG_COMMAND;
        cmd[1] = sub_command;
        cmd.pwrite_with(addr, 2, LE).unwrap();
        cmd.pwrite_with(len, 6, LE).unwrap();
        cmd
    }

    /// Reads `data.len()` bytes of target memory as aligned words.
    pub fn read_mem32(&mut self, addr: u32, data: &mut [u8]) -> Result<(), StlinkError> {
        if addr & 3 != 0 || data.len() & 3 != 0 {
            return Err(StlinkError::DataAlignment);
        }
        if data.len() > DATA_BUF_LEN {
            return Err(StlinkError::TransferTooLong(data.len()));
        }
        let cmd = Self::memory_command(commands::DEBUG_READ_MEM_32BIT, addr, data.len() as u16);
        self.device.write(&cmd, &[], data, TIMEOUT)
    }

    /// Writes target memory as aligned words. A staged flash loader plus
    /// its payload moves through here in a single transfer.
    pub fn write_mem32(&mut self, addr: u32, data: &[u8]) -> Result<(), StlinkError> {
        if addr & 3 != 0 || data.len() & 3 != 0 {
            return Err(StlinkError::DataAlignment);
        }
        if data.len() > DATA_BUF_LEN {
            return Err(StlinkError::TransferTooLong(data.len()));
        }
        let cmd = Self::memory_command(commands::DEBUG_WRITE_MEM_32BIT, addr, data.len() as u16);
        self.device.write(&cmd, data, &mut [], TIMEOUT)
    }

    /// Byte-granular memory write, limited to one USB packet.
    pub fn write_mem8(&mut self, addr: u32, data: &[u8]) -> Result<(), StlinkError> {
        if data.len() > WRITE8_MAX {
            return Err(StlinkError::TransferTooLong(data.len()));
        }
        let cmd = Self::memory_command(commands::DEBUG_WRITE_MEM_8BIT, addr, data.len() as u16);
        self.device.write(&cmd, data, &mut [], TIMEOUT)
    }

    /// Reads one aligned 32-bit word. Unaligned addresses are masked down.
    pub fn read_word(&mut self, addr: u32) -> Result<u32, StlinkError> {
        let mut buf = [0u8; 4];
        self.read_mem32(addr & !3, &mut buf)?;
        Ok((&buf[..]).pread_with(0, LE).unwrap())
    }

    pub fn write_word(&mut self, addr: u32, value: u32) -> Result<(), StlinkError> {
        self.write_mem32(addr, &value.to_le_bytes())
    }

    /// Reads `len` bytes starting at any address.
    ///
    /// An unaligned start is served by one aligned word read whose tail
    /// lands in the output; the rest moves in 1 KiB blocks, with the last
    /// block rounded up to whole words on the wire and truncated on copy.
    pub fn read(&mut self, addr: u32, len: usize) -> Result<Vec<u8>, StlinkError> {
        let mut result = Vec::with_capacity(len);
        if len == 0 {
            return Ok(result);
        }

        let mut addr = addr;
        let mut remaining = len;

        if addr & 3 != 0 {
            let skip = (addr & 3) as usize;
            let take = usize::min(4 - skip, remaining);
            let mut word = [0u8; 4];
            self.read_mem32(addr & !3, &mut word)?;
            result.extend_from_slice(&word[skip..skip + take]);
            addr = (addr & !3) + 4;
            remaining -= take;
        }

        while remaining > 0 {
            let take = usize::min(remaining, READ_BLOCK_SIZE);
            let rounded = (take + 3) & !3;
            let mut block = vec![0u8; rounded];
            self.read_mem32(addr, &mut block)?;
            result.extend_from_slice(&block[..take]);
            addr += take as u32;
            remaining -= take;
        }

        Ok(result)
    }

    /// Identifies the target chip and caches the table row.
    ///
    /// The idcode lives at 0xE0042000; Cortex-M0 parts read zero there and
    /// expose it at 0x40015800 instead. An unknown idcode selects the
    /// generic fall-back row with a warning.
    pub fn identify_chip(&mut self) -> Result<&'static ChipParams, StlinkError> {
        let core_id = self.read_core_id()?;

        let mut idcode = self.read_word(DBGMCU_IDCODE)?;
        if idcode == 0 {
            idcode = self.read_word(DBGMCU_IDCODE_M0)?;
        }
        self.cpu_idcode = idcode;

        if core_id & 0x0f00_ffff != 0x0b00_1477 {
            log::warn!(
                "SWD core ID {:#010x} did not match the expected pattern 0x-B--1477.",
                core_id
            );
        }

        self.chip_index = chips::lookup(idcode);
        let chip = &chips::CHIP_TABLE[self.chip_index];
        if self.chip_index == 0 {
            log::warn!(
                "MCU ID {:#010x} is not in the device table, using generic STM32 parameters.",
                idcode
            );
        }
        log::debug!(
            "SWD core ID {:#010x}, MCU ID {:#010x}: {}.",
            core_id,
            idcode,
            chip.name
        );
        Ok(chip)
    }

    /// The table row selected by [`identify_chip`](Self::identify_chip),
    /// or the generic fall-back before identification.
    pub fn chip(&self) -> &'static ChipParams {
        &chips::CHIP_TABLE[self.chip_index]
    }

    pub fn cpu_idcode(&self) -> u32 {
        self.cpu_idcode
    }

    /// Reads the flash size the device reports about itself, in KiB.
    ///
    /// STMicro moves this register around between lines, so the probe is a
    /// cascade of known locations keyed on the device ID.
    pub fn read_flash_size_kb(&mut self) -> Result<Option<u32>, StlinkError> {
        let dev_id = self.cpu_idcode & 0x0fff;

        let size = if dev_id == 0x416 || dev_id == 0x427 {
            Some(self.read_word(0x1ff8_004c)? & 0xffff)
        } else if dev_id == 0x436 {
            Some(if self.read_word(0x1ff8_004c)? & 1 != 0 {
                256
            } else {
                384
            })
        } else {
            let f1 = self.read_word(0x1fff_f7e0)?;
            if f1 != 0xffff_ffff {
                Some(f1 & 0xffff)
            } else {
                let f4 = self.read_word(0x1fff_7a20)?;
                if f4 != 0xffff_ffff {
                    Some(f4 >> 16)
                } else {
                    let f0 = self.read_word(0x1fff_f7cc)?;
                    if f0 != 0xffff_ffff {
                        Some(f0 & 0xffff)
                    } else {
                        None
                    }
                }
            }
        };

        self.flash_size_kb = size;
        Ok(size)
    }

    pub fn flash_size_kb(&self) -> Option<u32> {
        self.flash_size_kb
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn version_parse() {
        // STLink 2, JTAG 17, SWIM 4, then VID/PID little-endian.
        let buf = [0x24, 0x44, 0x83, 0x04, 0x48, 0x37];
        let version = StLinkVersion::parse(&buf);
        assert_eq!(version.stlink, 2);
        assert_eq!(version.jtag, 17);
        assert_eq!(version.swim, 4);
        assert_eq!(version.vid, 0x0483);
        assert_eq!(version.pid, 0x3748);
        assert!(version.is_stlink());
        assert!(version.is_v2());
    }

    #[test]
    fn version_rejects_v1() {
        let buf = [0x11, 0x44, 0x83, 0x04, 0x44, 0x37];
        let version = StLinkVersion::parse(&buf);
        assert_eq!(version.pid, 0x3744);
        assert!(version.is_stlink());
        assert!(!version.is_v2());
    }

    #[test]
    fn all_regs_parse() {
        let mut buf = [0u8; 84];
        for (idx, chunk) in buf.chunks_mut(4).enumerate() {
            chunk.copy_from_slice(&(idx as u32 * 0x0101).to_le_bytes());
        }
        let regs = CoreRegisters::parse(&buf);
        assert_eq!(regs.r[0], 0);
        assert_eq!(regs.r[15], 15 * 0x0101);
        assert_eq!(regs.xpsr, 16 * 0x0101);
        assert_eq!(regs.main_sp, 17 * 0x0101);
        assert_eq!(regs.process_sp, 18 * 0x0101);
        assert_eq!(regs.rw, 19 * 0x0101);
        assert_eq!(regs.rw2, 20 * 0x0101);
    }

    #[test]
    fn memory_command_framing() {
        let cmd = STLink::<crate::usb_interface::STLinkUSBDevice>::memory_command(
            commands::DEBUG_READ_MEM_32BIT,
            0x0800_0400,
            16,
        );
        assert_eq!(cmd[0], 0xf2);
        assert_eq!(cmd[1], 0x07);
        assert_eq!(&cmd[2..6], &[0x00, 0x04, 0x00, 0x08]);
        assert_eq!(&cmd[6..8], &[0x10, 0x00]);
        assert_eq!(&cmd[8..10], &[0x00, 0x00]);
    }
}
