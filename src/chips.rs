//! The static device table consulted after chip identification.
//!
//! The table is keyed by the `DBGMCU_IDCODE` value. The first row is a
//! generic fall-back used when the idcode matches nothing; operations keep
//! working with conservative F1-style parameters.

/// The MCU device ID register on most STM32 parts.
pub const DBGMCU_IDCODE: u32 = 0xe004_2000;
/// Cortex-M0 parts mirror the device ID register into peripheral space and
/// read zero at the usual address.
pub const DBGMCU_IDCODE_M0: u32 = 0x4001_5800;

/// Flash controller generation of a chip, selecting the erase strategy and
/// the loader variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipFamily {
    /// FPEC of the F0/F1/F3 lines (PM0075), 16 bit write granularity.
    F1,
    /// The F2/F4 controller at 0x40023C00 (PM0081).
    F4,
    /// The EEPROM-style controller of the L1 line with its two-stage
    /// unlock.
    L1,
}

/// Everything the programmer needs to know about one chip.
#[derive(Debug, Clone, Copy)]
pub struct ChipParams {
    pub name: &'static str,
    pub family: ChipFamily,
    /// Expected SWD core ID.
    pub core_id: u32,
    pub dbgmcu_idcode: u32,
    pub flash_base: u32,
    pub flash_size: u32,
    pub flash_pgsize: u32,
    pub sysflash_base: u32,
    pub sysflash_size: u32,
    pub sysflash_pgsize: u32,
    pub sram_base: u32,
    pub sram_size: u32,
}

const KIB: u32 = 1024;

pub static CHIP_TABLE: &[ChipParams] = &[
    // Generic fall-back.
    ChipParams {
        name: "STM32",
        family: ChipFamily::F1,
        core_id: 0x1ba0_1477,
        dbgmcu_idcode: 0x1000_0400,
        flash_base: 0x0800_0000,
        flash_size: 128 * KIB,
        flash_pgsize: 1024,
        sysflash_base: 0x1fff_ec00,
        sysflash_size: 2 * KIB,
        sysflash_pgsize: 1024,
        sram_base: 0x2000_0000,
        sram_size: 8 * KIB,
    },
    // STM32F051 on the F0Discovery.
    ChipParams {
        name: "STM32F051-R8T6",
        family: ChipFamily::F1,
        core_id: 0x0bb1_1477,
        dbgmcu_idcode: 0x2000_6440,
        flash_base: 0x0800_0000,
        flash_size: 64 * KIB,
        flash_pgsize: 1024,
        sysflash_base: 0x1fff_ec00,
        sysflash_size: 8 * KIB,
        sysflash_pgsize: 1024,
        sram_base: 0x2000_0000,
        sram_size: 8 * KIB,
    },
    // STM32F100 on the VLDiscovery.
    ChipParams {
        name: "STM32F100",
        family: ChipFamily::F1,
        core_id: 0x1ba0_1477,
        dbgmcu_idcode: 0x1001_6420,
        flash_base: 0x0800_0000,
        flash_size: 128 * KIB,
        flash_pgsize: 1024,
        sysflash_base: 0x1fff_f000,
        sysflash_size: 2 * KIB,
        sysflash_pgsize: 1024,
        sram_base: 0x2000_0000,
        sram_size: 8 * KIB,
    },
    ChipParams {
        name: "STM32F103R4T6",
        family: ChipFamily::F1,
        core_id: 0x1ba0_1477,
        dbgmcu_idcode: 0x0000_5e7d,
        flash_base: 0x0800_0000,
        flash_size: 32 * KIB,
        flash_pgsize: 1024,
        sysflash_base: 0x1fff_f000,
        sysflash_size: 2 * KIB,
        sysflash_pgsize: 1024,
        sram_base: 0x2000_0000,
        sram_size: 4 * KIB,
    },
    // Medium-density 103Cxxx, the "blue pill" parts.
    ChipParams {
        name: "STM32F103C8T6",
        family: ChipFamily::F1,
        core_id: 0x1ba0_1477,
        dbgmcu_idcode: 0x2003_6410,
        flash_base: 0x0800_0000,
        flash_size: 64 * KIB,
        flash_pgsize: 1024,
        sysflash_base: 0x1fff_f000,
        sysflash_size: 2 * KIB,
        sysflash_pgsize: 1024,
        sram_base: 0x2000_0000,
        sram_size: 20 * KIB,
    },
    ChipParams {
        name: "STM32F105RB",
        family: ChipFamily::F1,
        core_id: 0x3ba0_0477,
        dbgmcu_idcode: 0x1001_6430,
        flash_base: 0x0800_0000,
        flash_size: 32 * KIB,
        flash_pgsize: 1024,
        sysflash_base: 0x1fff_f000,
        sysflash_size: 2 * KIB,
        sysflash_pgsize: 1024,
        sram_base: 0x2000_0000,
        sram_size: 4 * KIB,
    },
    // Low-density devices.
    ChipParams {
        name: "STM32F10x",
        family: ChipFamily::F1,
        core_id: 0x1ba0_1477,
        dbgmcu_idcode: 0x1001_6412,
        flash_base: 0x0800_0000,
        flash_size: 32 * KIB,
        flash_pgsize: 1024,
        sysflash_base: 0x1fff_f000,
        sysflash_size: 2 * KIB,
        sysflash_pgsize: 1024,
        sram_base: 0x2000_0000,
        sram_size: 4 * KIB,
    },
    // Medium-density devices.
    ChipParams {
        name: "STM32F10x",
        family: ChipFamily::F1,
        core_id: 0x1ba0_1477,
        dbgmcu_idcode: 0x1001_6410,
        flash_base: 0x0800_0000,
        flash_size: 128 * KIB,
        flash_pgsize: 1024,
        sysflash_base: 0x1fff_f000,
        sysflash_size: 2 * KIB,
        sysflash_pgsize: 1024,
        sram_base: 0x2000_0000,
        sram_size: 8 * KIB,
    },
    // High-density devices.
    ChipParams {
        name: "STM32F10x",
        family: ChipFamily::F1,
        core_id: 0x1ba0_1477,
        dbgmcu_idcode: 0x1001_6414,
        flash_base: 0x0800_0000,
        flash_size: 512 * KIB,
        flash_pgsize: 1024,
        sysflash_base: 0x1fff_f000,
        sysflash_size: 2 * KIB,
        sysflash_pgsize: 1024,
        sram_base: 0x2000_0000,
        sram_size: 8 * KIB,
    },
    // XL-density devices with the second flash bank.
    ChipParams {
        name: "STM32F10x",
        family: ChipFamily::F1,
        core_id: 0x1ba0_1477,
        dbgmcu_idcode: 0x1001_6430,
        flash_base: 0x0800_0000,
        flash_size: 1024 * KIB,
        flash_pgsize: 2048,
        sysflash_base: 0x1fff_e000,
        sysflash_size: 6 * KIB,
        sysflash_pgsize: 1024,
        sram_base: 0x2000_0000,
        sram_size: 8 * KIB,
    },
    // Connectivity devices, 107RBT6.
    ChipParams {
        name: "STM32F107",
        family: ChipFamily::F1,
        core_id: 0x1ba0_1477,
        dbgmcu_idcode: 0x1001_6418,
        flash_base: 0x0800_0000,
        flash_size: 256 * KIB,
        flash_pgsize: 2048,
        sysflash_base: 0x1fff_b000,
        sysflash_size: 18 * KIB,
        sysflash_pgsize: 1024,
        sram_base: 0x2000_0000,
        sram_size: 8 * KIB,
    },
    // L152RBT6 as on the 32L-Discovery.
    ChipParams {
        name: "STM32L152",
        family: ChipFamily::L1,
        core_id: 0x1ba0_1477,
        dbgmcu_idcode: 0x1018_6416,
        flash_base: 0x0800_0000,
        flash_size: 128 * KIB,
        flash_pgsize: 2048,
        sysflash_base: 0x1fff_b000,
        sysflash_size: 16 * KIB,
        sysflash_pgsize: 1024,
        sram_base: 0x2000_0000,
        sram_size: 8 * KIB,
    },
    // Type 422 F3 (Cortex M4) devices.
    ChipParams {
        name: "STM32F303VCT6",
        family: ChipFamily::F1,
        core_id: 0x3ba0_0477,
        dbgmcu_idcode: 0x1001_6422,
        flash_base: 0x0800_0000,
        flash_size: 256 * KIB,
        flash_pgsize: 2048,
        sysflash_base: 0x1fff_b000,
        sysflash_size: 18 * KIB,
        sysflash_pgsize: 1024,
        sram_base: 0x2000_0000,
        sram_size: 8 * KIB,
    },
    ChipParams {
        name: "STM32F407",
        family: ChipFamily::F4,
        core_id: 0x2ba0_1477,
        dbgmcu_idcode: 0x2000_6411,
        flash_base: 0x0800_0000,
        flash_size: 256 * KIB,
        flash_pgsize: 2048,
        sysflash_base: 0x1fff_b000,
        sysflash_size: 18 * KIB,
        sysflash_pgsize: 1024,
        sram_base: 0x2000_0000,
        sram_size: 8 * KIB,
    },
    ChipParams {
        name: "STM32F4xx",
        family: ChipFamily::F4,
        core_id: 0x2ba0_1477,
        dbgmcu_idcode: 0x1000_6420,
        flash_base: 0x0800_0000,
        flash_size: 256 * KIB,
        flash_pgsize: 2048,
        sysflash_base: 0x1fff_b000,
        sysflash_size: 18 * KIB,
        sysflash_pgsize: 1024,
        sram_base: 0x2000_0000,
        sram_size: 8 * KIB,
    },
];

/// Index of the table row matching `idcode`, falling back to the generic
/// entry 0.
pub fn lookup(idcode: u32) -> usize {
    CHIP_TABLE
        .iter()
        .position(|chip| chip.dbgmcu_idcode == idcode)
        .unwrap_or(0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn vldiscovery_lookup() {
        let chip = &CHIP_TABLE[lookup(0x1001_6420)];
        assert_eq!(chip.name, "STM32F100");
        assert_eq!(chip.flash_base, 0x0800_0000);
        assert_eq!(chip.flash_size, 128 * 1024);
        assert_eq!(chip.family, ChipFamily::F1);
    }

    #[test]
    fn unknown_idcode_selects_fallback() {
        assert_eq!(lookup(0xdead_beef), 0);
        assert_eq!(CHIP_TABLE[0].name, "STM32");
    }

    #[test]
    fn family_dispatch() {
        assert_eq!(CHIP_TABLE[lookup(0x1018_6416)].family, ChipFamily::L1);
        assert_eq!(CHIP_TABLE[lookup(0x2000_6411)].family, ChipFamily::F4);
        assert_eq!(CHIP_TABLE[lookup(0x2000_6440)].family, ChipFamily::F1);
    }
}
