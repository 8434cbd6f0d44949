//! Erase and programming support for the STM32 embedded flash.
//!
//! The dongle cannot generate the 16-bit bus cycles the FPEC needs, so
//! writing goes through a small Thumb stub staged into target SRAM: one
//! bulk transfer carries the stub, its parameter words and a chunk of
//! payload, then the PC is pointed at the stub and the core runs until it
//! hits the terminating breakpoint.

use scroll::{Pwrite, LE};
use thiserror::Error;

use crate::chips::{ChipFamily, ChipParams};
use crate::constants::CoreState;
use crate::stlink::{STLink, StlinkError, REG_PC};
use crate::usb_interface::StLinkUsb;

/// F1-class FPEC register block, PM0075.
const F1_FLASH_REGS: u32 = 0x4002_2000;
const F1_FLASH_KEYR: u32 = F1_FLASH_REGS + 0x04;
const F1_FLASH_SR: u32 = F1_FLASH_REGS + 0x0c;
const F1_FLASH_CR: u32 = F1_FLASH_REGS + 0x10;
const F1_FLASH_AR: u32 = F1_FLASH_REGS + 0x14;
/// Second FPEC bank on XL-density parts, offset 0x40 from the first.
const F1_FLASH_REGS_BANK2: u32 = 0x4002_2040;

/// Flash unlock key values, PM0075 2.3.1. The F4 block reuses them.
const FLASH_KEY1: u32 = 0x4567_0123;
const FLASH_KEY2: u32 = 0xcdef_89ab;

const FLASH_SR_BSY: u32 = 0x0001;
const FLASH_SR_PGERR: u32 = 0x0004;
const FLASH_SR_WRPRTERR: u32 = 0x0010;
const FLASH_SR_EOP: u32 = 0x0020;

const FLASH_CR_PER: u32 = 0x0002;
const FLASH_CR_MER: u32 = 0x0004;
const FLASH_CR_STRT: u32 = 0x0040;
const FLASH_CR_LOCK: u32 = 0x0080;

/// F4-class flash controller, PM0081. The L1 controller shares the base
/// address but not the register map.
const F4_FLASH_REGS: u32 = 0x4002_3c00;
const F4_FLASH_KEYR: u32 = F4_FLASH_REGS + 0x04;
const F4_FLASH_SR: u32 = F4_FLASH_REGS + 0x0c;
const F4_FLASH_CR: u32 = F4_FLASH_REGS + 0x10;
const F4_FLASH_SR_BSY: u32 = 0x0001_0000;
const F4_FLASH_CR_STRT: u32 = 0x0001_0000;

/// L1-class flash interface registers.
const L1_FLASH_REGS: u32 = 0x4002_3c00;
const L1_FLASH_PEKEYR: u32 = L1_FLASH_REGS + 0x0c;
const L1_FLASH_PRGKEYR: u32 = L1_FLASH_REGS + 0x10;
const L1_FLASH_SR: u32 = L1_FLASH_REGS + 0x18;
const L1_FLASH_OBR: u32 = L1_FLASH_REGS + 0x1c;

const L1_FLASH_PEKEY1: u32 = 0x89ab_cdef;
const L1_FLASH_PEKEY2: u32 = 0x0203_0405;
const L1_FLASH_PRGKEY1: u32 = 0x8c9d_aebf;
const L1_FLASH_PRGKEY2: u32 = 0x1314_1516;

/// Page address reserved to mean "erase all user flash".
pub const MASS_ERASE: u32 = 0xa11;

/// Flash writes move through SRAM in chunks of this size. Writing one
/// chunk takes 40-70 ms on an F1 part.
const WRITE_CHUNK: usize = 2048;

/// Verify streams the source image in chunks of this size.
const VERIFY_CHUNK: usize = 128 * 1024;

/// Busy polls before an erase is declared hung. Completion typically takes
/// only two iterations.
const ERASE_POLL_LIMIT: usize = 1000;

/// Status polls before a running loader is declared hung. Well above the
/// 120-140 polls seen with a 250 microsecond USB poll interval.
const LOADER_POLL_LIMIT: usize = 200;

/// The halfword copy stub for the F1-class FPEC.
///
/// Parameters are the four words directly behind the code; the payload
/// follows them, so stub, parameters and data go out in one transfer. On
/// completion the stub clears the PG bit and halts on the breakpoint with
/// r2 = 0, r3 = final FLASH_SR and r5 = a busy-loop count.
const F1_LOADER: [u16; 22] = [
    0x480b, // ldr   r0, SRC_ADDR
    0x490c, // ldr   r1, TARGET_ADDR
    0x4a0c, // ldr   r2, COUNT
    0x4c09, // ldr   r4, FLASH_REGS
    0x2501, // movs  r5, #1            ; FLASH_CR_PG, then busy count
    0x6125, // str   r5, [r4, #16]     ; FLASH_CR
    // copy_hword:
    0xf830, 0x3b02, // ldrh  r3, [r0], #2
    0xf821, 0x3b02, // strh  r3, [r1], #2
    // busy:
    0x3501, // adds  r5, #1
    0x68e3, // ldr   r3, [r4, #12]     ; FLASH_SR
    0xf013, 0x0f01, // tst r3, #1      ; FLASH_SR_BSY
    0xd1fa, // bne   busy
    0xf013, 0x0f14, // tst r3, #0x14   ; WRPRTERR | PGERR
    0xd102, // bne   exit
    0x3a01, // subs  r2, #1
    0xd1f1, // bne   copy_hword
    0x6122, // str   r2, [r4, #16]     ; clear PG, r2 is zero here
    // exit:
    0xbe00, // bkpt  #0
];

/// The same stub against the F4 status bit layout. The L1 family reuses
/// it with its own controller base in the parameter word.
const F4_LOADER: [u16; 22] = [
    0x480b, // ldr   r0, SRC_ADDR
    0x490c, // ldr   r1, TARGET_ADDR
    0x4a0c, // ldr   r2, COUNT
    0x4c09, // ldr   r4, FLASH_REGS
    0x2501, // movs  r5, #1
    0x6125, // str   r5, [r4, #16]
    // copy_hword:
    0xf830, 0x3b02, // ldrh  r3, [r0], #2
    0xf821, 0x3b02, // strh  r3, [r1], #2
    // busy:
    0x3501, // adds  r5, #1
    0x68e3, // ldr   r3, [r4, #12]
    0xf013, 0x0f01, // tst r3, #1
    0xd1fa, // bne   busy
    0xf013, 0x0ff0, // tst r3, #0xF0   ; the PG*ERR group
    0xd102, // bne   exit
    0x3a01, // subs  r2, #1
    0xd1f1, // bne   copy_hword
    0x6122, // str   r2, [r4, #16]
    // exit:
    0xbe00, // bkpt  #0
];

/// Bytes of loader code ahead of the parameter words.
const LOADER_CODE_LEN: usize = 44;
/// Code plus the four parameter words; the payload starts here.
const LOADER_IMAGE_LEN: usize = LOADER_CODE_LEN + 16;

#[derive(Error, Debug)]
pub enum FlashError {
    #[error("flash erase timed out waiting for the busy flag, status {status:#010x}")]
    EraseTimeout { status: u32 },
    #[error("flash erase failed, status {status:#010x}")]
    EraseFailed { status: u32 },
    #[error("wrote a flash location that was not erased (status {status:#04x})")]
    NotErased { status: u32 },
    #[error("wrote a write-protected flash region (status {status:#04x})")]
    WriteProtected { status: u32 },
    #[error("the flash loader did not halt within {0} status polls")]
    LoaderHang(usize),
    #[error("flash contents diverge from the source at {address:#010x}")]
    VerifyMismatch { address: u32 },
    #[error(transparent)]
    Probe(#[from] StlinkError),
}

/// Assembles the single SRAM image: stub code, the parameter tail
/// `{controller base, source, target, halfword count}`, then the payload
/// padded up to whole words.
fn loader_image(
    code: &[u16; 22],
    ctrl_base: u32,
    sram_base: u32,
    flash_addr: u32,
    payload: &[u8],
) -> Vec<u8> {
    let staged = (payload.len() + 3) & !3;
    let mut image = vec![0xffu8; LOADER_IMAGE_LEN + staged];

    let mut offset = 0;
    for halfword in code.iter() {
        image.pwrite_with(*halfword, offset, LE).unwrap();
        offset += 2;
    }

    // An odd payload programs one extra halfword; its filler byte reads
    // back as unprogrammed flash.
    let halfwords = ((payload.len() + 1) & !1) as u32 / 2;
    image.pwrite_with(ctrl_base, offset, LE).unwrap();
    image
        .pwrite_with(sram_base + LOADER_IMAGE_LEN as u32, offset + 4, LE)
        .unwrap();
    image.pwrite_with(flash_addr, offset + 8, LE).unwrap();
    image.pwrite_with(halfwords, offset + 12, LE).unwrap();

    image[LOADER_IMAGE_LEN..LOADER_IMAGE_LEN + payload.len()].copy_from_slice(payload);
    image
}

/// Erase, program and verify operations against one identified chip.
pub struct Flasher<'probe, D: StLinkUsb> {
    probe: &'probe mut STLink<D>,
    chip: &'static ChipParams,
}

impl<'probe, D: StLinkUsb> Flasher<'probe, D> {
    pub fn new(probe: &'probe mut STLink<D>) -> Self {
        let chip = probe.chip();
        Self { probe, chip }
    }

    /// Erases the flash page containing `page_addr`, or all user flash
    /// when passed [`MASS_ERASE`].
    pub fn erase_page(&mut self, page_addr: u32) -> Result<(), FlashError> {
        match self.chip.family {
            ChipFamily::F1 => self.erase_f1(page_addr),
            ChipFamily::F4 => self.erase_f4(page_addr),
            ChipFamily::L1 => self.erase_l1(page_addr),
        }
    }

    pub fn erase_all(&mut self) -> Result<(), FlashError> {
        self.erase_page(MASS_ERASE)
    }

    fn erase_f1(&mut self, page_addr: u32) -> Result<(), FlashError> {
        // Unlock, then clear any leftover status bits.
        self.probe.write_word(F1_FLASH_KEYR, FLASH_KEY1)?;
        self.probe.write_word(F1_FLASH_KEYR, FLASH_KEY2)?;
        self.probe.write_word(
            F1_FLASH_SR,
            FLASH_SR_EOP | FLASH_SR_WRPRTERR | FLASH_SR_PGERR,
        )?;

        if page_addr == MASS_ERASE {
            self.probe.write_word(F1_FLASH_CR, FLASH_CR_MER)?;
            self.probe
                .write_word(F1_FLASH_CR, FLASH_CR_STRT | FLASH_CR_MER)?;
        } else {
            self.probe.write_word(F1_FLASH_AR, page_addr)?;
            // A single combined control write does not start the erase.
            self.probe.write_word(F1_FLASH_CR, FLASH_CR_PER)?;
            self.probe
                .write_word(F1_FLASH_CR, FLASH_CR_STRT | FLASH_CR_PER)?;
        }

        let status = self.poll_idle(F1_FLASH_SR, FLASH_SR_BSY)?;
        if status & FLASH_SR_EOP == 0 {
            log::error!(
                "Flash erase of {:#010x} failed, status {:#010x}.",
                page_addr,
                status
            );
            return Err(FlashError::EraseFailed { status });
        }
        log::debug!("Erased flash page {:#010x}, status {:#010x}.", page_addr, status);
        Ok(())
    }

    fn erase_f4(&mut self, page_addr: u32) -> Result<(), FlashError> {
        self.probe.write_word(F4_FLASH_KEYR, FLASH_KEY1)?;
        self.probe.write_word(F4_FLASH_KEYR, FLASH_KEY2)?;
        self.probe.write_word(F4_FLASH_SR, 0xf3)?;

        if page_addr == MASS_ERASE {
            self.probe.write_word(F4_FLASH_CR, FLASH_CR_MER)?;
            self.probe
                .write_word(F4_FLASH_CR, F4_FLASH_CR_STRT | FLASH_CR_MER)?;
        } else {
            // The sector index lives in CR bits [6:3].
            let sector = page_addr & 0x0f;
            self.probe
                .write_word(F4_FLASH_CR, 0x0000_0202 | (sector << 3))?;
            self.probe
                .write_word(F4_FLASH_CR, 0x0001_0202 | (sector << 3))?;
        }

        self.poll_idle(F4_FLASH_SR, F4_FLASH_SR_BSY)?;
        Ok(())
    }

    fn erase_l1(&mut self, page_addr: u32) -> Result<(), FlashError> {
        // Two-stage unlock: the PECR lock first, then the program lock.
        self.probe.write_word(L1_FLASH_PEKEYR, L1_FLASH_PEKEY1)?;
        self.probe.write_word(L1_FLASH_PEKEYR, L1_FLASH_PEKEY2)?;
        self.probe.write_word(L1_FLASH_PRGKEYR, L1_FLASH_PRGKEY1)?;
        self.probe.write_word(L1_FLASH_PRGKEYR, L1_FLASH_PRGKEY2)?;

        if page_addr == MASS_ERASE {
            // Mass erase by switching read protection on and back off.
            self.probe.write_word(L1_FLASH_OBR, 0x01)?;
            self.probe.write_word(L1_FLASH_OBR, 0xaa)?;
        } else {
            let sector = page_addr & 0x0f;
            self.probe
                .write_word(F4_FLASH_CR, 0x0000_0202 | (sector << 3))?;
            self.probe
                .write_word(F4_FLASH_CR, 0x0001_0202 | (sector << 3))?;
        }

        self.poll_idle(L1_FLASH_SR, FLASH_SR_BSY)?;
        Ok(())
    }

    /// Reads the status register until the busy flag clears, returning the
    /// final status.
    fn poll_idle(&mut self, sr_addr: u32, busy: u32) -> Result<u32, FlashError> {
        let mut status = 0;
        for _ in 0..ERASE_POLL_LIMIT {
            status = self.probe.read_word(sr_addr)?;
            if status & busy == 0 {
                return Ok(status);
            }
        }
        Err(FlashError::EraseTimeout { status })
    }

    /// Status register consulted after a write, per family.
    fn status_reg(&self) -> u32 {
        match self.chip.family {
            ChipFamily::F1 => F1_FLASH_SR,
            ChipFamily::F4 => F4_FLASH_SR,
            ChipFamily::L1 => L1_FLASH_SR,
        }
    }

    /// Controller block the loader pokes for a write landing at
    /// `flash_addr`. High-density F1 parts switch to the second bank past
    /// the 512 KiB boundary.
    fn controller_base(&self, flash_addr: u32) -> u32 {
        match self.chip.family {
            ChipFamily::F1 => {
                if self.chip.flash_size > 256 * 1024 && flash_addr >= 0x0808_0000 {
                    F1_FLASH_REGS_BANK2
                } else {
                    F1_FLASH_REGS
                }
            }
            ChipFamily::F4 | ChipFamily::L1 => F4_FLASH_REGS,
        }
    }

    fn unlock(&mut self) -> Result<(), FlashError> {
        match self.chip.family {
            ChipFamily::F1 => {
                self.probe.write_word(F1_FLASH_KEYR, FLASH_KEY1)?;
                self.probe.write_word(F1_FLASH_KEYR, FLASH_KEY2)?;
                self.probe.write_word(
                    F1_FLASH_SR,
                    FLASH_SR_EOP | FLASH_SR_WRPRTERR | FLASH_SR_PGERR,
                )?;
            }
            ChipFamily::F4 => {
                self.probe.write_word(F4_FLASH_KEYR, FLASH_KEY1)?;
                self.probe.write_word(F4_FLASH_KEYR, FLASH_KEY2)?;
                self.probe.write_word(F4_FLASH_SR, 0xf3)?;
            }
            ChipFamily::L1 => {
                self.probe.write_word(L1_FLASH_PEKEYR, L1_FLASH_PEKEY1)?;
                self.probe.write_word(L1_FLASH_PEKEYR, L1_FLASH_PEKEY2)?;
                self.probe.write_word(L1_FLASH_PRGKEYR, L1_FLASH_PRGKEY1)?;
                self.probe.write_word(L1_FLASH_PRGKEYR, L1_FLASH_PRGKEY2)?;
            }
        }
        Ok(())
    }

    fn lock(&mut self) -> Result<(), FlashError> {
        let cr = match self.chip.family {
            ChipFamily::F1 => F1_FLASH_CR,
            ChipFamily::F4 | ChipFamily::L1 => F4_FLASH_CR,
        };
        self.probe.write_word(cr, FLASH_CR_LOCK)?;
        Ok(())
    }

    /// Writes `data` to flash starting at `flash_addr`.
    ///
    /// The covered pages must have been erased. The flash is re-locked on
    /// every exit path, and the first failing chunk aborts the loop.
    pub fn write(&mut self, flash_addr: u32, data: &[u8]) -> Result<(), FlashError> {
        log::info!(
            "Flash write {:#010x}..{:#010x}.",
            flash_addr,
            flash_addr + data.len() as u32
        );

        self.unlock()?;
        let result = self.write_chunks(flash_addr, data);
        let lock = self.lock();
        result.and(lock)
    }

    fn write_chunks(&mut self, flash_addr: u32, data: &[u8]) -> Result<(), FlashError> {
        for (idx, chunk) in data.chunks(WRITE_CHUNK).enumerate() {
            let addr = flash_addr + (idx * WRITE_CHUNK) as u32;
            self.run_loader(addr, chunk)?;
        }

        let status = self.probe.read_word(self.status_reg())? & 0x15;
        if status & FLASH_SR_PGERR != 0 {
            return Err(FlashError::NotErased { status });
        }
        if status & FLASH_SR_WRPRTERR != 0 {
            return Err(FlashError::WriteProtected { status });
        }
        Ok(())
    }

    /// Stages the loader with one chunk of payload, runs it, and waits for
    /// the breakpoint halt.
    fn run_loader(&mut self, flash_addr: u32, payload: &[u8]) -> Result<(), FlashError> {
        let code = match self.chip.family {
            ChipFamily::F1 => &F1_LOADER,
            ChipFamily::F4 | ChipFamily::L1 => &F4_LOADER,
        };
        let sram_base = self.chip.sram_base;
        let image = loader_image(
            code,
            self.controller_base(flash_addr),
            sram_base,
            flash_addr,
            payload,
        );

        // Loader, parameters and data all in a single transfer.
        self.probe.write_mem32(sram_base, &image)?;
        // Run the stub by pointing the PC at it.
        self.probe.write_reg(REG_PC, sram_base)?;
        self.probe.run()?;

        for _ in 0..LOADER_POLL_LIMIT {
            if self.probe.get_status()? == CoreState::Halted {
                return Ok(());
            }
        }
        log::error!(
            "Flash loader still running after {} polls at {:#010x}.",
            LOADER_POLL_LIMIT,
            flash_addr
        );
        Err(FlashError::LoaderHang(LOADER_POLL_LIMIT))
    }

    /// Compares flash contents against `data`, streaming the read-back in
    /// large chunks. The first mismatching byte aborts.
    pub fn verify(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        let mut addr = addr;
        for chunk in data.chunks(VERIFY_CHUNK) {
            let readback = self.probe.read(addr, chunk.len())?;
            if let Some(idx) = chunk
                .iter()
                .zip(readback.iter())
                .position(|(expected, read)| expected != read)
            {
                return Err(FlashError::VerifyMismatch {
                    address: addr + idx as u32,
                });
            }
            addr += chunk.len() as u32;
        }
        Ok(())
    }
}
