//! An emulated STM32 target behind the bulk command protocol.
//!
//! The mock keeps a sparse byte memory, the core register file, and enough
//! of the F1 FPEC state machine (key sequence, busy flag, latched status
//! bits) to exercise erase and the download-and-run flash loader. Tests
//! keep a clone of the shared state handle for assertions.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use scroll::{Pread, Pwrite, LE};
use stlink_flash::{StLinkUsb, StlinkError};

pub const SRAM_BASE: u32 = 0x2000_0000;
pub const FLASH_BASE: u32 = 0x0800_0000;
pub const FLASH_SIZE: u32 = 128 * 1024;
pub const PAGE_SIZE: u32 = 1024;

const FLASH_KEYR: u32 = 0x4002_2004;
const FLASH_SR: u32 = 0x4002_200c;
const FLASH_CR: u32 = 0x4002_2010;
const FLASH_AR: u32 = 0x4002_2014;

const KEY1: u32 = 0x4567_0123;
const KEY2: u32 = 0xcdef_89ab;

const SR_BSY: u32 = 0x01;
const SR_PGERR: u32 = 0x04;
const SR_WRPRTERR: u32 = 0x10;
const SR_EOP: u32 = 0x20;

const CR_PER: u32 = 0x02;
const CR_MER: u32 = 0x04;
const CR_STRT: u32 = 0x40;
const CR_LOCK: u32 = 0x80;

const CORE_RUNNING: u8 = 0x80;
const CORE_HALTED: u8 = 0x81;

#[derive(Debug)]
pub struct TargetState {
    pub mem: BTreeMap<u32, u8>,
    pub regs: [u32; 21],
    /// Raw mode code as reported by GetCurrentMode.
    pub mode: u16,
    pub core: u8,
    pub connected: bool,
    pub core_id: u32,

    // FPEC emulation.
    pub unlocked: bool,
    key_stage: bool,
    pub sr_latched: u32,
    busy_polls: u32,
    /// Status register reads since the last STRT, for poll-count checks.
    pub sr_reads_since_start: u32,
    pub ar: u32,

    /// Parameter tail of the last loader run: controller base, source,
    /// target, halfword count.
    pub last_loader: Option<(u32, u32, u32, u32)>,
    pub breakpoints: Vec<(u8, u32, u8)>,

    // Failure injection.
    pub write_protected: bool,
    pub hang_loader: bool,
    pub busy_forever: bool,
    /// Running responses returned before a finished loader reports Halted.
    pub running_polls: u32,
    pending_halt: Option<u32>,
}

impl TargetState {
    fn new() -> Self {
        TargetState {
            mem: BTreeMap::new(),
            regs: [0; 21],
            mode: 2,
            core: CORE_HALTED,
            connected: true,
            core_id: 0x1ba0_1477,
            unlocked: false,
            key_stage: false,
            sr_latched: 0,
            busy_polls: 0,
            sr_reads_since_start: 0,
            ar: 0,
            last_loader: None,
            breakpoints: Vec::new(),
            write_protected: false,
            hang_loader: false,
            busy_forever: false,
            running_polls: 1,
            pending_halt: None,
        }
    }

    /// An STM32F100 as found on the VLDiscovery.
    pub fn f100() -> Self {
        let mut st = Self::new();
        st.set_word(0xe004_2000, 0x1001_6420);
        // Flash size register of the F1 line.
        st.set_word(0x1fff_f7e0, 128);
        st
    }

    /// A Cortex-M0 part whose idcode reads zero at the usual address.
    pub fn m0() -> Self {
        let mut st = Self::new();
        st.core_id = 0x0bb1_1477;
        st.set_word(0x4001_5800, 0x2000_6440);
        st
    }

    pub fn set_word(&mut self, addr: u32, value: u32) {
        for (idx, byte) in value.to_le_bytes().iter().enumerate() {
            self.mem.insert(addr + idx as u32, *byte);
        }
    }

    pub fn byte(&self, addr: u32) -> u8 {
        match self.mem.get(&addr) {
            Some(byte) => *byte,
            // Unwritten flash reads erased.
            None if (FLASH_BASE..FLASH_BASE + FLASH_SIZE).contains(&addr) => 0xff,
            None => 0,
        }
    }

    pub fn word(&self, addr: u32) -> u32 {
        u32::from_le_bytes([
            self.byte(addr),
            self.byte(addr + 1),
            self.byte(addr + 2),
            self.byte(addr + 3),
        ])
    }

    fn halfword(&self, addr: u32) -> u16 {
        u16::from_le_bytes([self.byte(addr), self.byte(addr + 1)])
    }

    fn erase_range(&mut self, start: u32, len: u32) {
        let keys: Vec<u32> = self.mem.range(start..start + len).map(|(k, _)| *k).collect();
        for key in keys {
            self.mem.remove(&key);
        }
    }

    fn flash_sr(&mut self) -> u32 {
        self.sr_reads_since_start += 1;
        if self.busy_forever {
            return SR_BSY;
        }
        if self.busy_polls > 0 {
            self.busy_polls -= 1;
            return SR_BSY | self.sr_latched;
        }
        self.sr_latched
    }

    fn fpec_write(&mut self, addr: u32, value: u32) {
        match addr {
            FLASH_KEYR => {
                if value == KEY1 {
                    self.key_stage = true;
                } else if value == KEY2 && self.key_stage {
                    self.unlocked = true;
                } else {
                    self.key_stage = false;
                }
            }
            // Status bits are write-one-to-clear.
            FLASH_SR => self.sr_latched &= !value,
            FLASH_AR => {
                if self.unlocked {
                    self.ar = value;
                }
            }
            FLASH_CR => {
                if !self.unlocked {
                    return;
                }
                if value & CR_LOCK != 0 {
                    self.unlocked = false;
                    self.key_stage = false;
                    return;
                }
                if value & CR_STRT != 0 {
                    self.sr_reads_since_start = 0;
                    self.busy_polls = 2;
                    if value & CR_MER != 0 {
                        self.erase_range(FLASH_BASE, FLASH_SIZE);
                        self.sr_latched |= SR_EOP;
                    } else if value & CR_PER != 0 {
                        let page = self.ar & !(PAGE_SIZE - 1);
                        self.erase_range(page, PAGE_SIZE);
                        self.sr_latched |= SR_EOP;
                    }
                }
            }
            _ => {}
        }
    }

    /// Interprets the staged loader image the way the Thumb stub would.
    fn run_loader(&mut self) {
        let ctrl = self.word(SRAM_BASE + 44);
        let src = self.word(SRAM_BASE + 48);
        let target = self.word(SRAM_BASE + 52);
        let count = self.word(SRAM_BASE + 56);
        self.last_loader = Some((ctrl, src, target, count));

        self.core = CORE_RUNNING;
        if self.hang_loader {
            return;
        }

        let mut remaining = count;
        let mut busy = 1u32;
        for idx in 0..count {
            if self.write_protected {
                self.sr_latched |= SR_WRPRTERR;
                break;
            }
            let dest = target + idx * 2;
            if self.halfword(dest) != 0xffff {
                self.sr_latched |= SR_PGERR;
                break;
            }
            let lo = self.byte(src + idx * 2);
            let hi = self.byte(src + idx * 2 + 1);
            self.mem.insert(dest, lo);
            self.mem.insert(dest + 1, hi);
            remaining -= 1;
            busy += 1;
        }

        self.regs[2] = remaining;
        self.regs[3] = self.sr_latched;
        self.regs[5] = busy;
        self.pending_halt = Some(self.running_polls);
    }
}

#[derive(Debug, Clone)]
pub struct MockUsb {
    pub state: Rc<RefCell<TargetState>>,
}

impl MockUsb {
    pub fn new(state: TargetState) -> (Self, Rc<RefCell<TargetState>>) {
        let state = Rc::new(RefCell::new(state));
        (
            MockUsb {
                state: state.clone(),
            },
            state,
        )
    }
}

fn status_ok(read_data: &mut [u8]) {
    read_data[0] = 0x80;
    read_data[1] = 0;
}

fn debug_command(st: &mut TargetState, cmd: &[u8], write_data: &[u8], read_data: &mut [u8]) {
    match cmd[1] {
        // Enter mode; both parameters land in debug mode here.
        0x20 => st.mode = 2,
        0x21 => st.mode = 1,
        0x22 => {
            read_data.pwrite_with(st.core_id, 0, LE).unwrap();
        }
        // GetStatus.
        0x01 => {
            if let Some(polls) = st.pending_halt {
                if polls == 0 {
                    st.core = CORE_HALTED;
                    st.pending_halt = None;
                } else {
                    st.pending_halt = Some(polls - 1);
                }
            }
            read_data[0] = st.core;
            read_data[1] = 0;
        }
        // ForceDebug, ResetSys, StepCore all leave the core halted.
        0x02 | 0x03 | 0x0a => {
            st.core = CORE_HALTED;
            status_ok(read_data);
        }
        // RunCore; running from the SRAM base means the loader was staged.
        0x09 => {
            status_ok(read_data);
            if st.regs[15] == SRAM_BASE {
                st.run_loader();
            } else {
                st.core = CORE_RUNNING;
            }
        }
        // ReadAllRegs.
        0x04 => {
            for (idx, reg) in st.regs.iter().enumerate() {
                read_data.pwrite_with(*reg, idx * 4, LE).unwrap();
            }
        }
        // ReadOneReg.
        0x05 => {
            read_data
                .pwrite_with(st.regs[cmd[2] as usize], 0, LE)
                .unwrap();
        }
        // WriteReg.
        0x06 => {
            let value: u32 = (&cmd[3..7]).pread_with(0, LE).unwrap();
            st.regs[cmd[2] as usize] = value;
            status_ok(read_data);
        }
        // ReadMem32.
        0x07 => {
            let addr: u32 = (&cmd[2..6]).pread_with(0, LE).unwrap();
            if addr == FLASH_SR && read_data.len() == 4 {
                let sr = st.flash_sr();
                read_data.pwrite_with(sr, 0, LE).unwrap();
            } else {
                for (idx, byte) in read_data.iter_mut().enumerate() {
                    *byte = st.byte(addr + idx as u32);
                }
            }
        }
        // WriteMem32.
        0x08 => {
            let addr: u32 = (&cmd[2..6]).pread_with(0, LE).unwrap();
            if write_data.len() == 4 && (FLASH_KEYR..=FLASH_AR).contains(&addr) {
                let value: u32 = (&write_data[..]).pread_with(0, LE).unwrap();
                st.fpec_write(addr, value);
            } else {
                for (idx, byte) in write_data.iter().enumerate() {
                    st.mem.insert(addr + idx as u32, *byte);
                }
            }
        }
        // WriteMem8.
        0x0d => {
            let addr: u32 = (&cmd[2..6]).pread_with(0, LE).unwrap();
            for (idx, byte) in write_data.iter().enumerate() {
                st.mem.insert(addr + idx as u32, *byte);
            }
        }
        // SetFP / ClearFP.
        0x0b => {
            let addr: u32 = (&cmd[3..7]).pread_with(0, LE).unwrap();
            st.breakpoints.push((cmd[2], addr, cmd[7]));
            status_ok(read_data);
        }
        0x0e => {
            let slot = cmd[2];
            st.breakpoints.retain(|bp| bp.0 != slot);
            status_ok(read_data);
        }
        _ => {}
    }
}

impl StLinkUsb for MockUsb {
    fn write(
        &mut self,
        cmd: &[u8],
        write_data: &[u8],
        read_data: &mut [u8],
        _timeout: Duration,
    ) -> Result<(), StlinkError> {
        let mut st = self.state.borrow_mut();
        if !st.connected {
            return Err(StlinkError::Usb(rusb::Error::NoDevice));
        }

        match cmd[0] {
            // GetVersion: STLink 2, JTAG 0x11, SWIM 4.
            0xf1 => {
                let packed: u16 = (2 << 12) | (0x11 << 6) | 4;
                read_data[0] = (packed >> 8) as u8;
                read_data[1] = packed as u8;
                read_data.pwrite_with(0x0483u16, 2, LE).unwrap();
                read_data.pwrite_with(0x3748u16, 4, LE).unwrap();
            }
            0xf5 => {
                let mode = st.mode;
                read_data.pwrite_with(mode, 0, LE).unwrap();
            }
            // DFU exit drops the dongle off the bus.
            0xf3 => {
                if cmd[1] == 0x07 {
                    st.connected = false;
                }
            }
            0xf2 => debug_command(&mut st, cmd, write_data, read_data),
            _ => {}
        }
        Ok(())
    }

    fn reopen(&mut self) -> Result<(), StlinkError> {
        let mut st = self.state.borrow_mut();
        if !st.connected {
            // The dongle re-enumerates in mass storage mode.
            st.connected = true;
            st.mode = 1;
        }
        Ok(())
    }
}
