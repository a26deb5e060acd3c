//! Debugger register bridge.
//!
//! Index-mapped access to the register file for an external debugger stub.
//! The index layout is a fixed convention: 0-31 are the GPRs, 33 is LO,
//! 34 is HI, 37 is the PC. Every other index reads as zero and ignores
//! writes — out-of-range access is defined, never an error.

use super::context::CpuContext;
use crate::memory::MemoryPort;

/// Number of registers the bridge exposes.
pub const REG_COUNT: usize = 73;

/// LO under the debugger index convention.
pub const REG_LO: usize = 33;

/// HI under the debugger index convention.
pub const REG_HI: usize = 34;

/// PC under the debugger index convention.
pub const REG_PC: usize = 37;

/// Read a register by debugger index.
pub fn reg_read(ctx: &CpuContext, reg: usize) -> u32 {
    match reg {
        0..=31 => ctx.gpr.read(reg as u8),
        REG_LO => ctx.lo,
        REG_HI => ctx.hi,
        REG_PC => ctx.pc(),
        _ => 0,
    }
}

/// Write a register by debugger index.
pub fn reg_write(ctx: &mut CpuContext, reg: usize, value: u32) {
    match reg {
        0..=31 => ctx.gpr.write(reg as u8, value),
        REG_LO => ctx.lo = value,
        REG_HI => ctx.hi = value,
        REG_PC => ctx.set_pc(value),
        _ => {}
    }
}

/// Byte-wide memory peek for the debugger.
pub fn mem_read<M: MemoryPort>(mem: &M, addr: u32) -> u8 {
    mem.read_byte(addr)
}

/// Byte-wide memory poke for the debugger.
pub fn mem_write<M: MemoryPort>(mem: &mut M, addr: u32, byte: u8) {
    mem.write_byte(addr, byte);
}
