#![allow(unused)]

pub mod commands {
    // Commands handled by the dongle itself.
    pub const GET_VERSION: u8 = 0xf1;
    pub const DEBUG_COMMAND: u8 = 0xf2;
    pub const DFU_COMMAND: u8 = 0xf3;
    pub const STM8_COMMAND: u8 = 0xf4; // v2-only, reserved for SWIM/STM8
    pub const GET_CURRENT_MODE: u8 = 0xf5;
    pub const CORTEX_M4_COMMAND: u8 = 0xf6; // v2-only, reserved

    // Sub-command of DFU_COMMAND that kicks the dongle out of DFU mode.
    pub const DFU_EXIT: u8 = 0x07;

    // Mode control sub-commands, prefixed by DEBUG_COMMAND.
    pub const DEBUG_ENTER_MODE: u8 = 0x20;
    pub const DEBUG_EXIT: u8 = 0x21;
    pub const DEBUG_READ_CORE_ID: u8 = 0x22;

    // Parameters for DEBUG_ENTER_MODE.
    pub const DEBUG_ENTER_SWD: u8 = 0xa3;
    pub const DEBUG_ENTER_JTAG: u8 = 0x00;

    // The regular debug sub-commands.
    pub const DEBUG_GET_STATUS: u8 = 0x01;
    pub const DEBUG_FORCE_DEBUG: u8 = 0x02;
    pub const DEBUG_RESET_SYS: u8 = 0x03;
    pub const DEBUG_READ_ALL_REGS: u8 = 0x04;
    pub const DEBUG_READ_ONE_REG: u8 = 0x05;
    pub const DEBUG_WRITE_REG: u8 = 0x06;
    pub const DEBUG_READ_MEM_32BIT: u8 = 0x07;
    pub const DEBUG_WRITE_MEM_32BIT: u8 = 0x08;
    pub const DEBUG_RUN_CORE: u8 = 0x09;
    pub const DEBUG_STEP_CORE: u8 = 0x0a;
    pub const DEBUG_SET_FP: u8 = 0x0b;
    pub const DEBUG_WRITE_MEM_8BIT: u8 = 0x0d;
    pub const DEBUG_CLEAR_FP: u8 = 0x0e;
    pub const DEBUG_WRITE_DEBUG_REG: u8 = 0x0f;

    // The alternate API (0x30..0x3c). Present on newer firmware; the v2
    // regular command set above covers everything this crate needs.
    pub const DEBUG_ALT_USE_API: u8 = 0x30;
    pub const DEBUG_ALT_READ_ID: u8 = 0x31;
    pub const DEBUG_ALT_RESET_TARGET: u8 = 0x32;
    pub const DEBUG_ALT_READ_REG: u8 = 0x33;
    pub const DEBUG_ALT_WRITE_REG: u8 = 0x34;
    pub const DEBUG_ALT_READ_ALL_REGS: u8 = 0x3a;
    pub const DEBUG_SET_NRST: u8 = 0x3c;
}

/// Two-byte command status. Only the low byte carries information.
pub const STATUS_OK: u8 = 0x80;
pub const STATUS_FALSE: u8 = 0x81;

/// Low status byte of a GetStatus response.
pub const CORE_RUNNING: u8 = 0x80;
pub const CORE_HALTED: u8 = 0x81;

/// Modes returned by GET_CURRENT_MODE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The dongle is updating its own firmware.
    Dfu = 0x00,
    /// The flawed mass storage emulation of the v1 protocol.
    MassStorage = 0x01,
    /// JTAG or SWD debugging.
    Debug = 0x02,
    /// Single wire interface for STM8 parts.
    Swim = 0x03,
    Bootloader = 0x04,
}

/// Execution state of the target core, as far as the host knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    Running,
    Halted,
    Unknown,
}

impl CoreState {
    /// Maps the low byte of a GetStatus response.
    pub fn from_status(status: u8) -> Self {
        match status {
            CORE_RUNNING => CoreState::Running,
            CORE_HALTED => CoreState::Halted,
            _ => CoreState::Unknown,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn core_state_from_status() {
        assert_eq!(CoreState::from_status(0x80), CoreState::Running);
        assert_eq!(CoreState::from_status(0x81), CoreState::Halted);
        assert_eq!(CoreState::from_status(0x00), CoreState::Unknown);
        assert_eq!(CoreState::from_status(0xff), CoreState::Unknown);
    }
}
