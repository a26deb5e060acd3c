//! Coprocessor-1 execution unit.
//!
//! IEEE-754 single/double arithmetic, NaN-aware compares, conversions and
//! the moves between the FPU and GPR files. Doubles live in even/odd slot
//! pairs (see [`crate::cpu::registers::FpuFile`]).
//!
//! `madd.*`/`msub.*` are computed as two independently rounded operations
//! (multiply, then add or subtract), not as a single-rounding fused
//! multiply-add. Conversions truncate toward zero with no rounding-mode
//! awareness.

use super::{ExecuteResult, FpCond};
use crate::cpu::context::CpuContext;

const CONTINUE: ExecuteResult = ExecuteResult::Continue;

// ---- arithmetic, single precision ----

pub fn add_s(ctx: &mut CpuContext, fd: u8, fs: u8, ft: u8) -> ExecuteResult {
    let result = ctx.fpr.read_single(fs) + ctx.fpr.read_single(ft);
    ctx.fpr.write_single(fd, result);
    CONTINUE
}

pub fn sub_s(ctx: &mut CpuContext, fd: u8, fs: u8, ft: u8) -> ExecuteResult {
    let result = ctx.fpr.read_single(fs) - ctx.fpr.read_single(ft);
    ctx.fpr.write_single(fd, result);
    CONTINUE
}

pub fn mul_s(ctx: &mut CpuContext, fd: u8, fs: u8, ft: u8) -> ExecuteResult {
    let result = ctx.fpr.read_single(fs) * ctx.fpr.read_single(ft);
    ctx.fpr.write_single(fd, result);
    CONTINUE
}

pub fn div_s(ctx: &mut CpuContext, fd: u8, fs: u8, ft: u8) -> ExecuteResult {
    let result = ctx.fpr.read_single(fs) / ctx.fpr.read_single(ft);
    ctx.fpr.write_single(fd, result);
    CONTINUE
}

pub fn abs_s(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    let result = ctx.fpr.read_single(fs).abs();
    ctx.fpr.write_single(fd, result);
    CONTINUE
}

pub fn neg_s(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    let result = -ctx.fpr.read_single(fs);
    ctx.fpr.write_single(fd, result);
    CONTINUE
}

pub fn sqrt_s(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    let result = ctx.fpr.read_single(fs).sqrt();
    ctx.fpr.write_single(fd, result);
    CONTINUE
}

pub fn mov_s(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    let bits = ctx.fpr.read_raw(fs);
    ctx.fpr.write_raw(fd, bits);
    CONTINUE
}

/// `fd = fs * ft + fr`, two roundings.
pub fn madd_s(ctx: &mut CpuContext, fd: u8, fr: u8, fs: u8, ft: u8) -> ExecuteResult {
    let result = ctx.fpr.read_single(fs) * ctx.fpr.read_single(ft) + ctx.fpr.read_single(fr);
    ctx.fpr.write_single(fd, result);
    CONTINUE
}

/// `fd = fs * ft - fr`, two roundings.
pub fn msub_s(ctx: &mut CpuContext, fd: u8, fr: u8, fs: u8, ft: u8) -> ExecuteResult {
    let result = ctx.fpr.read_single(fs) * ctx.fpr.read_single(ft) - ctx.fpr.read_single(fr);
    ctx.fpr.write_single(fd, result);
    CONTINUE
}

// ---- arithmetic, double precision ----

pub fn add_d(ctx: &mut CpuContext, fd: u8, fs: u8, ft: u8) -> ExecuteResult {
    let result = ctx.fpr.read_double(fs) + ctx.fpr.read_double(ft);
    ctx.fpr.write_double(fd, result);
    CONTINUE
}

pub fn sub_d(ctx: &mut CpuContext, fd: u8, fs: u8, ft: u8) -> ExecuteResult {
    let result = ctx.fpr.read_double(fs) - ctx.fpr.read_double(ft);
    ctx.fpr.write_double(fd, result);
    CONTINUE
}

pub fn mul_d(ctx: &mut CpuContext, fd: u8, fs: u8, ft: u8) -> ExecuteResult {
    let result = ctx.fpr.read_double(fs) * ctx.fpr.read_double(ft);
    ctx.fpr.write_double(fd, result);
    CONTINUE
}

pub fn div_d(ctx: &mut CpuContext, fd: u8, fs: u8, ft: u8) -> ExecuteResult {
    let result = ctx.fpr.read_double(fs) / ctx.fpr.read_double(ft);
    ctx.fpr.write_double(fd, result);
    CONTINUE
}

pub fn abs_d(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    let result = ctx.fpr.read_double(fs).abs();
    ctx.fpr.write_double(fd, result);
    CONTINUE
}

pub fn neg_d(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    let result = -ctx.fpr.read_double(fs);
    ctx.fpr.write_double(fd, result);
    CONTINUE
}

pub fn sqrt_d(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    let result = ctx.fpr.read_double(fs).sqrt();
    ctx.fpr.write_double(fd, result);
    CONTINUE
}

pub fn mov_d(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    let value = ctx.fpr.read_double(fs);
    ctx.fpr.write_double(fd, value);
    CONTINUE
}

pub fn madd_d(ctx: &mut CpuContext, fd: u8, fr: u8, fs: u8, ft: u8) -> ExecuteResult {
    let result = ctx.fpr.read_double(fs) * ctx.fpr.read_double(ft) + ctx.fpr.read_double(fr);
    ctx.fpr.write_double(fd, result);
    CONTINUE
}

pub fn msub_d(ctx: &mut CpuContext, fd: u8, fr: u8, fs: u8, ft: u8) -> ExecuteResult {
    let result = ctx.fpr.read_double(fs) * ctx.fpr.read_double(ft) - ctx.fpr.read_double(fr);
    ctx.fpr.write_double(fd, result);
    CONTINUE
}

// ---- compares ----

/// Evaluate an IEEE predicate. Ordered forms are false when either operand
/// is NaN; unordered forms are true.
fn predicate(cond: FpCond, a_nan: bool, b_nan: bool, eq: bool, lt: bool) -> bool {
    let unordered = a_nan || b_nan;
    match cond {
        FpCond::Eq => !unordered && eq,
        FpCond::Ole => !unordered && (lt || eq),
        FpCond::Olt => !unordered && lt,
        FpCond::Ueq => unordered || eq,
        FpCond::Ule => unordered || lt || eq,
        FpCond::Ult => unordered || lt,
        FpCond::Un => unordered,
    }
}

pub fn compare_s(ctx: &mut CpuContext, cond: FpCond, fs: u8, ft: u8) -> ExecuteResult {
    let a = ctx.fpr.read_single(fs);
    let b = ctx.fpr.read_single(ft);
    ctx.cc = predicate(cond, a.is_nan(), b.is_nan(), a == b, a < b);
    CONTINUE
}

pub fn compare_d(ctx: &mut CpuContext, cond: FpCond, fs: u8, ft: u8) -> ExecuteResult {
    let a = ctx.fpr.read_double(fs);
    let b = ctx.fpr.read_double(ft);
    ctx.cc = predicate(cond, a.is_nan(), b.is_nan(), a == b, a < b);
    CONTINUE
}

// ---- conversions ----

pub fn cvt_s_d(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    let result = ctx.fpr.read_double(fs) as f32;
    ctx.fpr.write_single(fd, result);
    CONTINUE
}

pub fn cvt_d_s(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    let result = ctx.fpr.read_single(fs) as f64;
    ctx.fpr.write_double(fd, result);
    CONTINUE
}

/// Convert the word in slot `fs` (as a signed integer) to double.
pub fn cvt_d_w(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    let result = ctx.fpr.read_raw(fs) as i32 as f64;
    ctx.fpr.write_double(fd, result);
    CONTINUE
}

/// Convert the word in slot `fs` (as a signed integer) to single.
pub fn cvt_s_w(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    let result = ctx.fpr.read_raw(fs) as i32 as f32;
    ctx.fpr.write_single(fd, result);
    CONTINUE
}

pub fn trunc_w_d(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    let result = ctx.fpr.read_double(fs) as i32;
    ctx.fpr.write_raw(fd, result as u32);
    CONTINUE
}

pub fn trunc_w_s(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    let result = ctx.fpr.read_single(fs) as i32;
    ctx.fpr.write_raw(fd, result as u32);
    CONTINUE
}

// ---- FPU <-> GPR moves ----

pub fn mfc1(ctx: &mut CpuContext, rt: u8, fs: u8) -> ExecuteResult {
    let bits = ctx.fpr.read_raw(fs);
    ctx.gpr.write(rt, bits);
    CONTINUE
}

pub fn mtc1(ctx: &mut CpuContext, rt: u8, fs: u8) -> ExecuteResult {
    let bits = ctx.gpr.read(rt);
    ctx.fpr.write_raw(fs, bits);
    CONTINUE
}

/// Move the high word of the double pair at `fs`; that is the even slot
/// itself under the pair convention.
pub fn mfhc1(ctx: &mut CpuContext, rt: u8, fs: u8) -> ExecuteResult {
    let bits = ctx.fpr.read_raw(fs);
    ctx.gpr.write(rt, bits);
    CONTINUE
}

/// Replace the high word of the double pair at `fs`.
pub fn mthc1(ctx: &mut CpuContext, rt: u8, fs: u8) -> ExecuteResult {
    let bits = ctx.gpr.read(rt);
    ctx.fpr.write_raw(fs, bits);
    CONTINUE
}

// ---- conditional moves ----

pub fn movz_s(ctx: &mut CpuContext, fd: u8, fs: u8, rt: u8) -> ExecuteResult {
    if ctx.gpr.read(rt) == 0 {
        mov_s(ctx, fd, fs)
    } else {
        CONTINUE
    }
}

pub fn movn_s(ctx: &mut CpuContext, fd: u8, fs: u8, rt: u8) -> ExecuteResult {
    if ctx.gpr.read(rt) != 0 {
        mov_s(ctx, fd, fs)
    } else {
        CONTINUE
    }
}

pub fn movz_d(ctx: &mut CpuContext, fd: u8, fs: u8, rt: u8) -> ExecuteResult {
    if ctx.gpr.read(rt) == 0 {
        mov_pair(ctx, fd, fs);
    }
    CONTINUE
}

pub fn movn_d(ctx: &mut CpuContext, fd: u8, fs: u8, rt: u8) -> ExecuteResult {
    if ctx.gpr.read(rt) != 0 {
        mov_pair(ctx, fd, fs);
    }
    CONTINUE
}

pub fn movt_s(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    if ctx.cc {
        mov_s(ctx, fd, fs)
    } else {
        CONTINUE
    }
}

pub fn movf_s(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    if !ctx.cc {
        mov_s(ctx, fd, fs)
    } else {
        CONTINUE
    }
}

pub fn movt_d(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    if ctx.cc {
        mov_pair(ctx, fd, fs);
    }
    CONTINUE
}

pub fn movf_d(ctx: &mut CpuContext, fd: u8, fs: u8) -> ExecuteResult {
    if !ctx.cc {
        mov_pair(ctx, fd, fs);
    }
    CONTINUE
}

/// Copy both raw slots of a double pair without interpreting the bits.
#[inline]
fn mov_pair(ctx: &mut CpuContext, fd: u8, fs: u8) {
    let high = ctx.fpr.read_raw(fs);
    let low = ctx.fpr.read_raw(fs.wrapping_add(1));
    ctx.fpr.write_raw(fd, high);
    ctx.fpr.write_raw(fd.wrapping_add(1), low);
}
