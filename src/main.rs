//! mips-emu: user-mode MIPS-I simulator.
//!
//! The library core executes pre-decoded instructions; producing them from
//! an instruction stream is a decoder's job, which this crate does not own.
//! This driver therefore runs a small built-in demo guest: it bootstraps a
//! process image from the command line arguments, prints a banner through
//! the o32 `write` syscall and exits with the guest's `argc`.

use std::collections::BTreeMap;
use std::env;

use anyhow::bail;

use mips_emu::syscall::numbers;
use mips_emu::{Config, Cpu, GuestMemory, Instr, ProcessBuilder, RunExit};

/// Entry point of the demo guest.
const ENTRY: u32 = 0x1000;

/// Where the driver places the banner bytes in guest memory.
const MSG_ADDR: u32 = 0x2000;

const BANNER: &[u8] = b"hello from the simulated guest\n";

/// The demo guest, already in decoded form:
///
/// ```text
/// addu  $t0, $a0, $zero        # save argc
/// li    $v0, write; li $a0, 1; li $a1, MSG; li $a2, len; syscall
/// addu  $a0, $t0, $zero        # exit(argc)
/// li    $v0, exit; syscall
/// ```
fn demo_program() -> BTreeMap<u32, Instr> {
    let code = [
        Instr::Addu { rd: 8, rs: 4, rt: 0 },
        Instr::Ori { rt: 2, rs: 0, imm: numbers::NR_WRITE as u16 },
        Instr::Ori { rt: 4, rs: 0, imm: 1 },
        Instr::Ori { rt: 5, rs: 0, imm: MSG_ADDR as u16 },
        Instr::Ori { rt: 6, rs: 0, imm: BANNER.len() as u16 },
        Instr::Syscall { code: 0 },
        Instr::Addu { rd: 4, rs: 8, rt: 0 },
        Instr::Ori { rt: 2, rs: 0, imm: numbers::NR_EXIT as u16 },
        Instr::Syscall { code: 0 },
    ];

    code.iter()
        .enumerate()
        .map(|(i, instr)| (ENTRY + (i as u32) * 4, *instr))
        .collect()
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let config = Config::get();
    let mut mem = GuestMemory::new(config.memory_size(), config.endianness());
    let mut cpu = Cpu::new();
    cpu.reset(ENTRY);

    // Build the guest process image from our own command line
    let args: Vec<String> = env::args().collect();
    let argv: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
    let mut builder = ProcessBuilder::new(mem.size());
    let image = builder.build(&argv, &mut cpu.ctx, &mut mem)?;
    log::info!(
        "process image: slot {} sp={:#010x} strings={:#010x}",
        image.slot,
        image.stack_pointer,
        image.string_table
    );

    mem.load_image(MSG_ADDR, BANNER);

    let program = demo_program();
    match cpu.run(&mut mem, |pc| program.get(&pc).copied(), 10_000) {
        RunExit::Exited { code } => {
            println!(
                "guest exited with code {} ({} instructions retired)",
                code, cpu.ctx.retired
            );
            std::process::exit(code);
        }
        RunExit::Trapped(trap) => bail!("guest trapped: {}", trap),
        RunExit::OutOfProgram { pc } => bail!("control left the program at {:#010x}", pc),
        RunExit::StepLimit => bail!("step limit exhausted"),
    }
}
