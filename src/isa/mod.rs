//! MIPS-I instruction semantics.
//!
//! This module owns the per-opcode state-transition functions. It receives
//! instructions already decoded — [`Instr`] is the closed set of decoded
//! forms, carrying register indices, immediates, shift amounts and jump
//! targets as plain fields — and mutates a [`CpuContext`] and a
//! [`MemoryPort`]. Fetch and decode belong to the caller.
//!
//! Execution units:
//!
//! - [`alu`]: integer arithmetic, logic, shifts, bit-field and conditional
//!   moves
//! - [`loadstore`]: byte/half/word and FP loads and stores, including the
//!   unaligned `lwl`/`lwr`/`swl`/`swr` merges
//! - [`branch`]: jumps and branches under the delay-slot `npc` discipline
//! - [`fpu`]: IEEE-754 single/double arithmetic, compares and conversions
//!
//! [`execute`] maps every [`Instr`] variant to its handler in one exhaustive
//! `match`, so adding an opcode without a handler is a compile error.

pub mod alu;
pub mod branch;
pub mod fpu;
pub mod loadstore;

use thiserror::Error;

use crate::cpu::context::CpuContext;
use crate::memory::MemoryPort;
use crate::syscall::SyscallEmu;

/// Fatal conditions raised by instruction execution.
///
/// These terminate the simulated process; they are returned to the driver
/// rather than aborting the host, so the core stays usable as a library.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Trap {
    /// Signed 32-bit overflow in `add`/`addi`.
    #[error("integer overflow in {instruction} at pc 0x{pc:08X}")]
    IntegerOverflow {
        /// Mnemonic of the trapping instruction.
        instruction: &'static str,
        /// Program counter at the trap.
        pc: u32,
    },

    /// `break` instruction.
    #[error("breakpoint (code {code}) at pc 0x{pc:08X}")]
    Breakpoint {
        /// Code field from the instruction.
        code: u32,
        /// Program counter at the trap.
        pc: u32,
    },

    /// `teq` with equal operands.
    #[error("trap on equal at pc 0x{pc:08X}")]
    TrapOnEqual {
        /// Program counter at the trap.
        pc: u32,
    },
}

/// Outcome of executing one instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteResult {
    /// Proceed to the instruction at `npc`.
    Continue,

    /// The guest requested termination (`exit`/`exit_group`).
    Exit {
        /// Guest exit code.
        code: i32,
    },

    /// A fatal trap; the simulated process is dead.
    Trap(Trap),
}

/// Floating-point compare predicate.
///
/// Ordered predicates are false whenever either operand is NaN; unordered
/// predicates are true in that case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpCond {
    /// `c.eq.*`
    Eq,
    /// `c.ole.*`
    Ole,
    /// `c.olt.*`
    Olt,
    /// `c.ueq.*`
    Ueq,
    /// `c.ule.*`
    Ule,
    /// `c.ult.*`
    Ult,
    /// `c.un.*`
    Un,
}

/// A decoded MIPS-I instruction.
///
/// Field conventions: `rd`/`rs`/`rt` are GPR indices, `fd`/`fs`/`ft`/`fr`
/// are FPU indices, `base`/`index` are GPR indices used for addressing,
/// `offset` is the sign-extended 16-bit displacement (branch offsets in
/// instruction units, load/store offsets in bytes), `target` is the raw
/// 26-bit jump field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instr {
    // Integer loads
    Lb { rt: u8, base: u8, offset: i16 },
    Lbu { rt: u8, base: u8, offset: i16 },
    Lh { rt: u8, base: u8, offset: i16 },
    Lhu { rt: u8, base: u8, offset: i16 },
    Lw { rt: u8, base: u8, offset: i16 },
    Lwl { rt: u8, base: u8, offset: i16 },
    Lwr { rt: u8, base: u8, offset: i16 },
    Ll { rt: u8, base: u8, offset: i16 },

    // Integer stores
    Sb { rt: u8, base: u8, offset: i16 },
    Sh { rt: u8, base: u8, offset: i16 },
    Sw { rt: u8, base: u8, offset: i16 },
    Swl { rt: u8, base: u8, offset: i16 },
    Swr { rt: u8, base: u8, offset: i16 },
    Sc { rt: u8, base: u8, offset: i16 },

    // FP loads and stores
    Lwc1 { ft: u8, base: u8, offset: i16 },
    Ldc1 { ft: u8, base: u8, offset: i16 },
    Swc1 { ft: u8, base: u8, offset: i16 },
    Sdc1 { ft: u8, base: u8, offset: i16 },
    Lwxc1 { fd: u8, index: u8, base: u8 },
    Ldxc1 { fd: u8, index: u8, base: u8 },
    Swxc1 { fs: u8, index: u8, base: u8 },
    Sdxc1 { fs: u8, index: u8, base: u8 },

    // Immediate ALU
    Addi { rt: u8, rs: u8, imm: i16 },
    Addiu { rt: u8, rs: u8, imm: i16 },
    Slti { rt: u8, rs: u8, imm: i16 },
    Sltiu { rt: u8, rs: u8, imm: i16 },
    Andi { rt: u8, rs: u8, imm: u16 },
    Ori { rt: u8, rs: u8, imm: u16 },
    Xori { rt: u8, rs: u8, imm: u16 },
    Lui { rt: u8, imm: u16 },

    // Three-register ALU
    Add { rd: u8, rs: u8, rt: u8 },
    Addu { rd: u8, rs: u8, rt: u8 },
    Sub { rd: u8, rs: u8, rt: u8 },
    Subu { rd: u8, rs: u8, rt: u8 },
    Slt { rd: u8, rs: u8, rt: u8 },
    Sltu { rd: u8, rs: u8, rt: u8 },
    And { rd: u8, rs: u8, rt: u8 },
    Or { rd: u8, rs: u8, rt: u8 },
    Xor { rd: u8, rs: u8, rt: u8 },
    Nor { rd: u8, rs: u8, rt: u8 },
    Mul { rd: u8, rs: u8, rt: u8 },

    // Shifts and rotates
    Sll { rd: u8, rt: u8, shamt: u8 },
    Srl { rd: u8, rt: u8, shamt: u8 },
    Sra { rd: u8, rt: u8, shamt: u8 },
    Sllv { rd: u8, rt: u8, rs: u8 },
    Srlv { rd: u8, rt: u8, rs: u8 },
    Srav { rd: u8, rt: u8, rs: u8 },
    Rotr { rd: u8, rt: u8, shamt: u8 },
    Rotrv { rd: u8, rt: u8, rs: u8 },

    // Multiply / divide and HI/LO access
    Mult { rs: u8, rt: u8 },
    Multu { rs: u8, rt: u8 },
    Div { rs: u8, rt: u8 },
    Divu { rs: u8, rt: u8 },
    Mfhi { rd: u8 },
    Mthi { rs: u8 },
    Mflo { rd: u8 },
    Mtlo { rs: u8 },

    // Bit-field operations
    Clz { rd: u8, rs: u8 },
    Ext { rt: u8, rs: u8, msbd: u8, lsb: u8 },
    Seb { rd: u8, rt: u8 },
    Seh { rd: u8, rt: u8 },

    // Integer conditional moves
    Movz { rd: u8, rs: u8, rt: u8 },
    Movn { rd: u8, rs: u8, rt: u8 },
    Movf { rd: u8, rs: u8 },
    Movt { rd: u8, rs: u8 },

    // Jumps
    J { target: u32 },
    Jal { target: u32 },
    Jr { rs: u8 },
    Jalr { rd: u8, rs: u8 },

    // Conditional branches
    Beq { rs: u8, rt: u8, offset: i16 },
    Bne { rs: u8, rt: u8, offset: i16 },
    Blez { rs: u8, offset: i16 },
    Bgtz { rs: u8, offset: i16 },
    Bltz { rs: u8, offset: i16 },
    Bgez { rs: u8, offset: i16 },
    Bltzal { rs: u8, offset: i16 },
    Bgezal { rs: u8, offset: i16 },
    Bc1f { offset: i16 },
    Bc1t { offset: i16 },
    Bc1fl { offset: i16 },
    Bc1tl { offset: i16 },

    // FP arithmetic, single precision
    AddS { fd: u8, fs: u8, ft: u8 },
    SubS { fd: u8, fs: u8, ft: u8 },
    MulS { fd: u8, fs: u8, ft: u8 },
    DivS { fd: u8, fs: u8, ft: u8 },
    AbsS { fd: u8, fs: u8 },
    NegS { fd: u8, fs: u8 },
    SqrtS { fd: u8, fs: u8 },
    MovS { fd: u8, fs: u8 },
    MaddS { fd: u8, fr: u8, fs: u8, ft: u8 },
    MsubS { fd: u8, fr: u8, fs: u8, ft: u8 },

    // FP arithmetic, double precision
    AddD { fd: u8, fs: u8, ft: u8 },
    SubD { fd: u8, fs: u8, ft: u8 },
    MulD { fd: u8, fs: u8, ft: u8 },
    DivD { fd: u8, fs: u8, ft: u8 },
    AbsD { fd: u8, fs: u8 },
    NegD { fd: u8, fs: u8 },
    SqrtD { fd: u8, fs: u8 },
    MovD { fd: u8, fs: u8 },
    MaddD { fd: u8, fr: u8, fs: u8, ft: u8 },
    MsubD { fd: u8, fr: u8, fs: u8, ft: u8 },

    // FP compares
    CCondS { cond: FpCond, fs: u8, ft: u8 },
    CCondD { cond: FpCond, fs: u8, ft: u8 },

    // FP conversions
    CvtSD { fd: u8, fs: u8 },
    CvtDS { fd: u8, fs: u8 },
    CvtDW { fd: u8, fs: u8 },
    CvtSW { fd: u8, fs: u8 },
    TruncWD { fd: u8, fs: u8 },
    TruncWS { fd: u8, fs: u8 },

    // FPU <-> GPR moves
    Mfc1 { rt: u8, fs: u8 },
    Mtc1 { rt: u8, fs: u8 },
    Mfhc1 { rt: u8, fs: u8 },
    Mthc1 { rt: u8, fs: u8 },

    // FP conditional moves
    MovzS { fd: u8, fs: u8, rt: u8 },
    MovnS { fd: u8, fs: u8, rt: u8 },
    MovzD { fd: u8, fs: u8, rt: u8 },
    MovnD { fd: u8, fs: u8, rt: u8 },
    MovtS { fd: u8, fs: u8 },
    MovfS { fd: u8, fs: u8 },
    MovtD { fd: u8, fs: u8 },
    MovfD { fd: u8, fs: u8 },

    // Miscellaneous
    Nop,
    Sync,
    Syscall { code: u32 },
    Break { code: u32 },
    Teq { rs: u8, rt: u8 },
}

/// Execute one decoded instruction against the architectural state.
///
/// The caller has already run the `pc`/`npc` prologue for this instruction
/// (see [`CpuContext::advance`]); handlers that branch write `npc` only.
pub fn execute<M: MemoryPort>(
    instr: &Instr,
    ctx: &mut CpuContext,
    mem: &mut M,
    sys: &mut SyscallEmu,
) -> ExecuteResult {
    use Instr::*;

    match *instr {
        // Integer loads
        Lb { rt, base, offset } => loadstore::lb(ctx, mem, rt, base, offset),
        Lbu { rt, base, offset } => loadstore::lbu(ctx, mem, rt, base, offset),
        Lh { rt, base, offset } => loadstore::lh(ctx, mem, rt, base, offset),
        Lhu { rt, base, offset } => loadstore::lhu(ctx, mem, rt, base, offset),
        Lw { rt, base, offset } => loadstore::lw(ctx, mem, rt, base, offset),
        Lwl { rt, base, offset } => loadstore::lwl(ctx, mem, rt, base, offset),
        Lwr { rt, base, offset } => loadstore::lwr(ctx, mem, rt, base, offset),
        Ll { rt, base, offset } => loadstore::ll(ctx, mem, rt, base, offset),

        // Integer stores
        Sb { rt, base, offset } => loadstore::sb(ctx, mem, rt, base, offset),
        Sh { rt, base, offset } => loadstore::sh(ctx, mem, rt, base, offset),
        Sw { rt, base, offset } => loadstore::sw(ctx, mem, rt, base, offset),
        Swl { rt, base, offset } => loadstore::swl(ctx, mem, rt, base, offset),
        Swr { rt, base, offset } => loadstore::swr(ctx, mem, rt, base, offset),
        Sc { rt, base, offset } => loadstore::sc(ctx, mem, rt, base, offset),

        // FP loads and stores
        Lwc1 { ft, base, offset } => loadstore::lwc1(ctx, mem, ft, base, offset),
        Ldc1 { ft, base, offset } => loadstore::ldc1(ctx, mem, ft, base, offset),
        Swc1 { ft, base, offset } => loadstore::swc1(ctx, mem, ft, base, offset),
        Sdc1 { ft, base, offset } => loadstore::sdc1(ctx, mem, ft, base, offset),
        Lwxc1 { fd, index, base } => loadstore::lwxc1(ctx, mem, fd, index, base),
        Ldxc1 { fd, index, base } => loadstore::ldxc1(ctx, mem, fd, index, base),
        Swxc1 { fs, index, base } => loadstore::swxc1(ctx, mem, fs, index, base),
        Sdxc1 { fs, index, base } => loadstore::sdxc1(ctx, mem, fs, index, base),

        // Immediate ALU
        Addi { rt, rs, imm } => alu::addi(ctx, rt, rs, imm),
        Addiu { rt, rs, imm } => alu::addiu(ctx, rt, rs, imm),
        Slti { rt, rs, imm } => alu::slti(ctx, rt, rs, imm),
        Sltiu { rt, rs, imm } => alu::sltiu(ctx, rt, rs, imm),
        Andi { rt, rs, imm } => alu::andi(ctx, rt, rs, imm),
        Ori { rt, rs, imm } => alu::ori(ctx, rt, rs, imm),
        Xori { rt, rs, imm } => alu::xori(ctx, rt, rs, imm),
        Lui { rt, imm } => alu::lui(ctx, rt, imm),

        // Three-register ALU
        Add { rd, rs, rt } => alu::add(ctx, rd, rs, rt),
        Addu { rd, rs, rt } => alu::addu(ctx, rd, rs, rt),
        Sub { rd, rs, rt } => alu::sub(ctx, rd, rs, rt),
        Subu { rd, rs, rt } => alu::subu(ctx, rd, rs, rt),
        Slt { rd, rs, rt } => alu::slt(ctx, rd, rs, rt),
        Sltu { rd, rs, rt } => alu::sltu(ctx, rd, rs, rt),
        And { rd, rs, rt } => alu::and(ctx, rd, rs, rt),
        Or { rd, rs, rt } => alu::or(ctx, rd, rs, rt),
        Xor { rd, rs, rt } => alu::xor(ctx, rd, rs, rt),
        Nor { rd, rs, rt } => alu::nor(ctx, rd, rs, rt),
        Mul { rd, rs, rt } => alu::mul(ctx, rd, rs, rt),

        // Shifts and rotates
        Sll { rd, rt, shamt } => alu::sll(ctx, rd, rt, shamt),
        Srl { rd, rt, shamt } => alu::srl(ctx, rd, rt, shamt),
        Sra { rd, rt, shamt } => alu::sra(ctx, rd, rt, shamt),
        Sllv { rd, rt, rs } => alu::sllv(ctx, rd, rt, rs),
        Srlv { rd, rt, rs } => alu::srlv(ctx, rd, rt, rs),
        Srav { rd, rt, rs } => alu::srav(ctx, rd, rt, rs),
        Rotr { rd, rt, shamt } => alu::rotr(ctx, rd, rt, shamt),
        Rotrv { rd, rt, rs } => alu::rotrv(ctx, rd, rt, rs),

        // Multiply / divide and HI/LO access
        Mult { rs, rt } => alu::mult(ctx, rs, rt),
        Multu { rs, rt } => alu::multu(ctx, rs, rt),
        Div { rs, rt } => alu::div(ctx, rs, rt),
        Divu { rs, rt } => alu::divu(ctx, rs, rt),
        Mfhi { rd } => alu::mfhi(ctx, rd),
        Mthi { rs } => alu::mthi(ctx, rs),
        Mflo { rd } => alu::mflo(ctx, rd),
        Mtlo { rs } => alu::mtlo(ctx, rs),

        // Bit-field operations
        Clz { rd, rs } => alu::clz(ctx, rd, rs),
        Ext { rt, rs, msbd, lsb } => alu::ext(ctx, rt, rs, msbd, lsb),
        Seb { rd, rt } => alu::seb(ctx, rd, rt),
        Seh { rd, rt } => alu::seh(ctx, rd, rt),

        // Integer conditional moves
        Movz { rd, rs, rt } => alu::movz(ctx, rd, rs, rt),
        Movn { rd, rs, rt } => alu::movn(ctx, rd, rs, rt),
        Movf { rd, rs } => alu::movf(ctx, rd, rs),
        Movt { rd, rs } => alu::movt(ctx, rd, rs),

        // Jumps
        J { target } => branch::j(ctx, target),
        Jal { target } => branch::jal(ctx, target),
        Jr { rs } => branch::jr(ctx, rs),
        Jalr { rd, rs } => branch::jalr(ctx, rd, rs),

        // Conditional branches
        Beq { rs, rt, offset } => branch::beq(ctx, rs, rt, offset),
        Bne { rs, rt, offset } => branch::bne(ctx, rs, rt, offset),
        Blez { rs, offset } => branch::blez(ctx, rs, offset),
        Bgtz { rs, offset } => branch::bgtz(ctx, rs, offset),
        Bltz { rs, offset } => branch::bltz(ctx, rs, offset),
        Bgez { rs, offset } => branch::bgez(ctx, rs, offset),
        Bltzal { rs, offset } => branch::bltzal(ctx, rs, offset),
        Bgezal { rs, offset } => branch::bgezal(ctx, rs, offset),
        Bc1f { offset } | Bc1fl { offset } => branch::bc1f(ctx, offset),
        Bc1t { offset } | Bc1tl { offset } => branch::bc1t(ctx, offset),

        // FP arithmetic, single precision
        AddS { fd, fs, ft } => fpu::add_s(ctx, fd, fs, ft),
        SubS { fd, fs, ft } => fpu::sub_s(ctx, fd, fs, ft),
        MulS { fd, fs, ft } => fpu::mul_s(ctx, fd, fs, ft),
        DivS { fd, fs, ft } => fpu::div_s(ctx, fd, fs, ft),
        AbsS { fd, fs } => fpu::abs_s(ctx, fd, fs),
        NegS { fd, fs } => fpu::neg_s(ctx, fd, fs),
        SqrtS { fd, fs } => fpu::sqrt_s(ctx, fd, fs),
        MovS { fd, fs } => fpu::mov_s(ctx, fd, fs),
        MaddS { fd, fr, fs, ft } => fpu::madd_s(ctx, fd, fr, fs, ft),
        MsubS { fd, fr, fs, ft } => fpu::msub_s(ctx, fd, fr, fs, ft),

        // FP arithmetic, double precision
        AddD { fd, fs, ft } => fpu::add_d(ctx, fd, fs, ft),
        SubD { fd, fs, ft } => fpu::sub_d(ctx, fd, fs, ft),
        MulD { fd, fs, ft } => fpu::mul_d(ctx, fd, fs, ft),
        DivD { fd, fs, ft } => fpu::div_d(ctx, fd, fs, ft),
        AbsD { fd, fs } => fpu::abs_d(ctx, fd, fs),
        NegD { fd, fs } => fpu::neg_d(ctx, fd, fs),
        SqrtD { fd, fs } => fpu::sqrt_d(ctx, fd, fs),
        MovD { fd, fs } => fpu::mov_d(ctx, fd, fs),
        MaddD { fd, fr, fs, ft } => fpu::madd_d(ctx, fd, fr, fs, ft),
        MsubD { fd, fr, fs, ft } => fpu::msub_d(ctx, fd, fr, fs, ft),

        // FP compares
        CCondS { cond, fs, ft } => fpu::compare_s(ctx, cond, fs, ft),
        CCondD { cond, fs, ft } => fpu::compare_d(ctx, cond, fs, ft),

        // FP conversions
        CvtSD { fd, fs } => fpu::cvt_s_d(ctx, fd, fs),
        CvtDS { fd, fs } => fpu::cvt_d_s(ctx, fd, fs),
        CvtDW { fd, fs } => fpu::cvt_d_w(ctx, fd, fs),
        CvtSW { fd, fs } => fpu::cvt_s_w(ctx, fd, fs),
        TruncWD { fd, fs } => fpu::trunc_w_d(ctx, fd, fs),
        TruncWS { fd, fs } => fpu::trunc_w_s(ctx, fd, fs),

        // FPU <-> GPR moves
        Mfc1 { rt, fs } => fpu::mfc1(ctx, rt, fs),
        Mtc1 { rt, fs } => fpu::mtc1(ctx, rt, fs),
        Mfhc1 { rt, fs } => fpu::mfhc1(ctx, rt, fs),
        Mthc1 { rt, fs } => fpu::mthc1(ctx, rt, fs),

        // FP conditional moves
        MovzS { fd, fs, rt } => fpu::movz_s(ctx, fd, fs, rt),
        MovnS { fd, fs, rt } => fpu::movn_s(ctx, fd, fs, rt),
        MovzD { fd, fs, rt } => fpu::movz_d(ctx, fd, fs, rt),
        MovnD { fd, fs, rt } => fpu::movn_d(ctx, fd, fs, rt),
        MovtS { fd, fs } => fpu::movt_s(ctx, fd, fs),
        MovfS { fd, fs } => fpu::movf_s(ctx, fd, fs),
        MovtD { fd, fs } => fpu::movt_d(ctx, fd, fs),
        MovfD { fd, fs } => fpu::movf_d(ctx, fd, fs),

        // Miscellaneous
        Nop | Sync => ExecuteResult::Continue,
        Syscall { code } => sys.handle_syscall(code, ctx, mem),
        Break { code } => ExecuteResult::Trap(Trap::Breakpoint {
            code,
            pc: ctx.pc(),
        }),
        Teq { rs, rt } => {
            if ctx.gpr.read(rs) == ctx.gpr.read(rt) {
                ExecuteResult::Trap(Trap::TrapOnEqual { pc: ctx.pc() })
            } else {
                ExecuteResult::Continue
            }
        }
    }
}
