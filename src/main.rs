//! Command-line front end. Commands are free-form words executed left to
//! right against one attached STLink v2.

use std::fs;
use std::thread;
use std::time::Duration;

use structopt::StructOpt;
use thiserror::Error;

use stlink_flash::{
    CoreState, FlashError, Flasher, STLink, STLinkUSBDevice, StLinkUsb, StlinkError,
};

/// PortC register base on F1-style parts; the Discovery LEDs hang off PC8
/// and PC9.
const GPIOC: u32 = 0x4001_1000;
const GPIOC_CRH: u32 = GPIOC + 0x04;
const GPIOC_ODR: u32 = GPIOC + 0x0c;
const LED_BLUE: u32 = 1 << 8;
const LED_GREEN: u32 = 1 << 9;

#[derive(StructOpt)]
#[structopt(
    name = "stlink-flash",
    about = "Program and debug STM32 microcontrollers through an STLink v2"
)]
struct Cli {
    /// Report each action taken.
    #[structopt(short, long)]
    verbose: bool,

    /// Commands, run in order: program=<file>, info, version, blink, regs,
    /// reg<n>, wreg<n>=<v>, reset, run, step, status, debug, erase,
    /// erase=<addr>|all, read<addr>, write<addr>=<val>, flash:r:<file>,
    /// flash:w:<file>, flash:v:<file>, sys:r:<file>
    commands: Vec<String>,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Probe(#[from] StlinkError),
    #[error(transparent)]
    Flash(#[from] FlashError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unrecognized command '{0}'")]
    UnknownCommand(String),
    #[error("malformed command '{0}'")]
    BadArgument(String),
}

fn main() {
    let cli = Cli::from_args();

    let mut builder = pretty_env_logger::formatted_builder();
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    } else {
        builder.filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        });
    }
    builder.init();

    if cli.commands.is_empty() {
        eprintln!("No commands given; try --help.");
        std::process::exit(1);
    }

    std::process::exit(match run(&cli.commands) {
        Ok(()) => 0,
        Err(e) => {
            log::error!("{}", e);
            1
        }
    });
}

fn run(commands: &[String]) -> Result<(), CliError> {
    let mut probe = STLink::open()?;
    probe.kick_mode()?;
    let chip = probe.identify_chip()?;
    log::info!("Identified {}.", chip.name);

    for command in commands {
        log::debug!("Executing command {}.", command);
        if let Err(e) = execute(&mut probe, command) {
            match e {
                // An unknown word means the rest of the line is garbage.
                CliError::UnknownCommand(_) | CliError::BadArgument(_) => return Err(e),
                _ => log::error!("Command '{}' failed: {}.", command, e),
            }
        }
    }

    // Commands tend to stick in the dongle; a status query flushes them.
    let _ = probe.get_status();
    Ok(())
}

fn execute(probe: &mut STLink<STLinkUSBDevice>, command: &str) -> Result<(), CliError> {
    let chip = probe.chip();

    if command == "regs" {
        // The core must be halted for register access.
        println!("{}", probe.read_all_regs()?);
    } else if let Some(spec) = command.strip_prefix("wreg") {
        let (reg, value) = parse_assignment(command, spec)?;
        probe.write_reg(reg as u8, value)?;
    } else if let Some(num) = command.strip_prefix("reg") {
        let reg = parse_num(num).ok_or_else(|| CliError::BadArgument(command.into()))?;
        println!("Register {} is 0x{:08x}.", reg, probe.read_reg(reg as u8)?);
    } else if let Some(path) = command.strip_prefix("program=") {
        program(probe, path)?;
    } else if let Some(spec) = command.strip_prefix("write") {
        let (addr, value) = parse_assignment(command, spec)?;
        println!("Memory write 0x{:08x} = 0x{:08x}.", addr, value);
        probe.write_word(addr, value)?;
    } else if let Some(num) = command.strip_prefix("read") {
        let addr = parse_num(num).ok_or_else(|| CliError::BadArgument(command.into()))?;
        let bytes = probe.read(addr, 16)?;
        let mut words = [0u32; 4];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        println!(
            "Memory 0x{:08x} is {:08x} {:08x} {:08x} {:08x}.",
            addr, words[0], words[1], words[2], words[3]
        );
    } else if let Some(path) = command.strip_prefix("flash:r:") {
        log::info!(
            "Reading memory 0x{:08x}..0x{:08x} into {}.",
            chip.flash_base,
            chip.flash_base + chip.flash_size,
            path
        );
        let data = probe.read(chip.flash_base, chip.flash_size as usize)?;
        fs::write(path, data)?;
    } else if let Some(path) = command.strip_prefix("flash:w:") {
        let data = read_image(path, chip.flash_size)?;
        log::info!(
            "Writing {} into flash at 0x{:08x}.",
            path,
            chip.flash_base
        );
        let base = chip.flash_base;
        Flasher::new(probe).write(base, &data)?;
    } else if let Some(path) = command.strip_prefix("flash:v:") {
        let data = fs::read(path)?;
        let base = chip.flash_base;
        match Flasher::new(probe).verify(base, &data) {
            Ok(()) => println!("Check flash: file {} matched flash contents.", path),
            Err(e) => {
                println!("Check flash: file {} did not match flash contents.", path);
                return Err(e.into());
            }
        }
    } else if let Some(path) = command.strip_prefix("sys:r:") {
        log::info!(
            "Reading system memory 0x{:08x}..0x{:08x} into {}.",
            chip.sysflash_base,
            chip.sysflash_base + chip.sysflash_size,
            path
        );
        let data = probe.read(chip.sysflash_base, chip.sysflash_size as usize)?;
        fs::write(path, data)?;
    } else if command == "erase" {
        // Erase-all is what the user almost always wants here.
        probe.halt()?;
        probe.reset()?;
        let mut flasher = Flasher::new(probe);
        if let Err(e) = flasher.erase_all() {
            log::warn!("Mass erase failed ({}), retrying once.", e);
            flasher.erase_all()?;
        }
    } else if let Some(spec) = command.strip_prefix("erase=") {
        let addr = if spec == "all" {
            stlink_flash::MASS_ERASE
        } else {
            parse_num(spec).ok_or_else(|| CliError::BadArgument(command.into()))?
        };
        probe.halt()?;
        Flasher::new(probe).erase_page(addr)?;
    } else if command == "status" {
        let state = probe.get_status()?;
        println!(
            "ARM status is {}.",
            match state {
                CoreState::Running => "running",
                CoreState::Halted => "halted",
                CoreState::Unknown => "unknown",
            }
        );
    } else if command == "reset" {
        probe.reset()?;
    } else if command == "run" {
        probe.run()?;
    } else if command == "step" {
        probe.step()?;
    } else if command == "debug" {
        probe.halt()?;
    } else if command == "version" {
        let version = probe.get_version()?;
        println!("{}", version);
    } else if command == "info" {
        info(probe)?;
    } else if command == "blink" {
        blink(probe)?;
    } else {
        return Err(CliError::UnknownCommand(command.into()));
    }

    Ok(())
}

/// Parses command forms like `wreg3=0x10` or `write0x20000000=42`, where
/// `spec` is the part after the command word.
fn parse_assignment(command: &str, spec: &str) -> Result<(u32, u32), CliError> {
    let mut parts = spec.splitn(2, '=');
    let lhs = parts.next().and_then(parse_num);
    let rhs = parts.next().and_then(parse_num);
    match (lhs, rhs) {
        (Some(lhs), Some(rhs)) => Ok((lhs, rhs)),
        _ => Err(CliError::BadArgument(command.into())),
    }
}

/// Accepts decimal or 0x-prefixed hexadecimal.
fn parse_num(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

fn read_image(path: &str, flash_size: u32) -> Result<Vec<u8>, CliError> {
    let data = fs::read(path)?;
    if data.len() > flash_size as usize {
        log::warn!(
            "Program is LARGER THAN FLASH and may not fit; trying anyway. \
             {} is {:#x} bytes, flash is {:#x} bytes.",
            path,
            data.len(),
            flash_size
        );
    }
    Ok(data)
}

/// Full reprogramming cycle: halt, reset, mass erase, write, verify.
fn program(probe: &mut STLink<STLinkUSBDevice>, path: &str) -> Result<(), CliError> {
    let chip = probe.chip();
    let data = read_image(path, chip.flash_size)?;
    log::info!(
        "Writing program from {} into flash at 0x{:08x}.",
        path,
        chip.flash_base
    );

    probe.halt()?;
    probe.reset()?;

    let base = chip.flash_base;
    let mut flasher = Flasher::new(probe);
    if let Err(e) = flasher.erase_all() {
        log::warn!("Mass erase failed ({}), retrying once.", e);
        flasher.erase_all()?;
    }
    flasher.write(base, &data)?;
    flasher.verify(base, &data)?;
    println!("file {} matched flash contents", path);
    Ok(())
}

fn info(probe: &mut STLink<STLinkUSBDevice>) -> Result<(), CliError> {
    let chip = probe.chip();
    let idcode = probe.cpu_idcode();

    println!("Target STM32 MCU information:");
    println!(
        " Target DBGMCU_IDCODE {:03x} (rev {:04x}) {}.",
        idcode & 0x0fff,
        idcode >> 16,
        chip.name
    );
    println!(" CPU ID base 0x{:08x}.", probe.read_word(0xe000_ed00)?);

    match probe.read_flash_size_kb()? {
        Some(kb) => println!(" Flash size {}K.", kb),
        None => println!(" Flash size not reported."),
    }
    Ok(())
}

/// Visual liveness test: toggles the VLDiscovery LEDs on PC8/PC9 ten
/// times, then restores the pin configuration it found.
fn blink<D: StLinkUsb>(probe: &mut STLink<D>) -> Result<(), CliError> {
    let iocfg = probe.read_word(GPIOC_CRH)?;
    log::debug!("GPIOC_CRH = 0x{:08x}.", iocfg);

    // Make PC8/PC9 GPIO outputs unless they already are.
    let reconfigure = iocfg & 0xcc != 0;
    if reconfigure {
        probe.write_word(GPIOC_CRH, (iocfg & !0xff) | 0x11)?;
    }
    for _ in 0..10 {
        probe.write_word(GPIOC_ODR, LED_GREEN)?;
        thread::sleep(Duration::from_millis(100));
        probe.write_word(GPIOC_ODR, LED_BLUE)?;
        thread::sleep(Duration::from_millis(100));
    }
    if reconfigure {
        probe.write_word(GPIOC_CRH, iocfg)?;
    }
    Ok(())
}
