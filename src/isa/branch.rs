//! Control-transfer execution unit.
//!
//! All transfers honor the delay-slot discipline from
//! [`crate::cpu::context`]: the shared prologue has already advanced
//! `pc`/`npc` when these handlers run, so a taken branch writes its target
//! into `npc` only and the instruction after the branch still retires first.
//!
//! Relative targets are `pc + (offset << 2)`; `j`/`jal` paste the 26-bit
//! field into the top nibble of `pc`. Link writes store `pc + 4` — two
//! instructions past the branch itself.
//!
//! The likely variants (`bc1fl`, `bc1tl`) are aliased to their non-likely
//! forms: the delay slot is never nullified, preserving the behavior of the
//! functional model this core follows.

use super::ExecuteResult;
use crate::cpu::context::{abi, CpuContext};

const CONTINUE: ExecuteResult = ExecuteResult::Continue;

#[inline]
fn branch_target(ctx: &CpuContext, offset: i16) -> u32 {
    ctx.pc().wrapping_add(((offset as i32) << 2) as u32)
}

#[inline]
fn jump_target(ctx: &CpuContext, target: u32) -> u32 {
    (ctx.pc() & 0xF000_0000) | (target << 2)
}

#[inline]
fn take_branch(ctx: &mut CpuContext, offset: i16) {
    let target = branch_target(ctx, offset);
    log::trace!("branch taken to {:#010x}", target);
    ctx.set_npc(target);
}

pub fn j(ctx: &mut CpuContext, target: u32) -> ExecuteResult {
    let dest = jump_target(ctx, target);
    ctx.set_npc(dest);
    CONTINUE
}

pub fn jal(ctx: &mut CpuContext, target: u32) -> ExecuteResult {
    let link = ctx.pc().wrapping_add(4);
    ctx.gpr.write(abi::RA, link);
    let dest = jump_target(ctx, target);
    ctx.set_npc(dest);
    CONTINUE
}

pub fn jr(ctx: &mut CpuContext, rs: u8) -> ExecuteResult {
    let dest = ctx.gpr.read(rs);
    ctx.set_npc(dest);
    CONTINUE
}

/// Jump register with link; an unset `rd` field links into `$ra`.
pub fn jalr(ctx: &mut CpuContext, rd: u8, rs: u8) -> ExecuteResult {
    let dest = ctx.gpr.read(rs);
    ctx.set_npc(dest);
    let link_reg = if rd == 0 { abi::RA } else { rd };
    let link = ctx.pc().wrapping_add(4);
    ctx.gpr.write(link_reg, link);
    CONTINUE
}

pub fn beq(ctx: &mut CpuContext, rs: u8, rt: u8, offset: i16) -> ExecuteResult {
    if ctx.gpr.read(rs) == ctx.gpr.read(rt) {
        take_branch(ctx, offset);
    }
    CONTINUE
}

pub fn bne(ctx: &mut CpuContext, rs: u8, rt: u8, offset: i16) -> ExecuteResult {
    if ctx.gpr.read(rs) != ctx.gpr.read(rt) {
        take_branch(ctx, offset);
    }
    CONTINUE
}

pub fn blez(ctx: &mut CpuContext, rs: u8, offset: i16) -> ExecuteResult {
    let v = ctx.gpr.read(rs);
    if v == 0 || v & 0x8000_0000 != 0 {
        take_branch(ctx, offset);
    }
    CONTINUE
}

pub fn bgtz(ctx: &mut CpuContext, rs: u8, offset: i16) -> ExecuteResult {
    let v = ctx.gpr.read(rs);
    if v & 0x8000_0000 == 0 && v != 0 {
        take_branch(ctx, offset);
    }
    CONTINUE
}

pub fn bltz(ctx: &mut CpuContext, rs: u8, offset: i16) -> ExecuteResult {
    if ctx.gpr.read(rs) & 0x8000_0000 != 0 {
        take_branch(ctx, offset);
    }
    CONTINUE
}

pub fn bgez(ctx: &mut CpuContext, rs: u8, offset: i16) -> ExecuteResult {
    if ctx.gpr.read(rs) & 0x8000_0000 == 0 {
        take_branch(ctx, offset);
    }
    CONTINUE
}

/// Branch-and-link forms write the link register whether or not the branch
/// is taken.
pub fn bltzal(ctx: &mut CpuContext, rs: u8, offset: i16) -> ExecuteResult {
    let link = ctx.pc().wrapping_add(4);
    ctx.gpr.write(abi::RA, link);
    if ctx.gpr.read(rs) & 0x8000_0000 != 0 {
        take_branch(ctx, offset);
    }
    CONTINUE
}

pub fn bgezal(ctx: &mut CpuContext, rs: u8, offset: i16) -> ExecuteResult {
    let link = ctx.pc().wrapping_add(4);
    ctx.gpr.write(abi::RA, link);
    if ctx.gpr.read(rs) & 0x8000_0000 == 0 {
        take_branch(ctx, offset);
    }
    CONTINUE
}

pub fn bc1f(ctx: &mut CpuContext, offset: i16) -> ExecuteResult {
    if !ctx.cc {
        take_branch(ctx, offset);
    }
    CONTINUE
}

pub fn bc1t(ctx: &mut CpuContext, offset: i16) -> ExecuteResult {
    if ctx.cc {
        take_branch(ctx, offset);
    }
    CONTINUE
}
