//! Per-hart architectural state.
//!
//! [`CpuContext`] bundles everything an instruction handler may touch: the
//! register files, `hi`/`lo`, the FP condition code and the two program
//! counters that realize the branch-delay slot.
//!
//! # The `pc`/`npc` protocol
//!
//! Every retired instruction runs the same prologue before its opcode body:
//!
//! ```text
//! pc  = npc;
//! npc = pc + 4;
//! ```
//!
//! Branch bodies then write their target into `npc` only. The instruction
//! physically following a branch is fetched from the old `npc` first, so it
//! always executes before control transfers — the MIPS-I one-slot delay
//! contract. Link instructions store `pc + 4`, which is two instructions
//! past the branch itself.

use super::registers::{FpuFile, GprFile};

/// Conventional register indices used by the ABI.
pub mod abi {
    /// `$v0` — syscall number / return value.
    pub const V0: u8 = 2;
    /// `$a0` — first argument.
    pub const A0: u8 = 4;
    /// `$a1` — second argument.
    pub const A1: u8 = 5;
    /// `$a2` — third argument.
    pub const A2: u8 = 6;
    /// `$a3` — fourth argument, doubles as the syscall error flag.
    pub const A3: u8 = 7;
    /// `$sp` — stack pointer.
    pub const SP: u8 = 29;
    /// `$ra` — return address / link register.
    pub const RA: u8 = 31;
}

/// Complete state of one simulated MIPS-I hart.
#[derive(Clone)]
pub struct CpuContext {
    /// General purpose registers.
    pub gpr: GprFile,

    /// Coprocessor-1 registers.
    pub fpr: FpuFile,

    /// High word of multiply results / division remainder.
    pub hi: u32,

    /// Low word of multiply results / division quotient.
    pub lo: u32,

    /// Floating-point condition code, written by `c.*` compares.
    pub cc: bool,

    /// Program counter (address semantics per the module docs).
    pc: u32,

    /// Next program counter.
    npc: u32,

    /// Retired instruction count.
    pub retired: u64,

    /// Set once the hart has exited or trapped.
    pub halted: bool,
}

impl Default for CpuContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuContext {
    /// Create a context with all state zeroed.
    pub fn new() -> Self {
        Self {
            gpr: GprFile::new(),
            fpr: FpuFile::new(),
            hi: 0,
            lo: 0,
            cc: false,
            pc: 0,
            npc: 4,
            retired: 0,
            halted: false,
        }
    }

    /// Reset to the architectural start state with execution at `entry`.
    ///
    /// Zeroes the integer registers and `hi`/`lo` and re-arms the `pc`/`npc`
    /// pair, mirroring the processor's begin-of-simulation behavior.
    pub fn reset(&mut self, entry: u32) {
        self.gpr.clear();
        self.hi = 0;
        self.lo = 0;
        self.cc = false;
        self.pc = entry;
        self.npc = entry.wrapping_add(4);
        self.retired = 0;
        self.halted = false;
    }

    /// Current program counter.
    #[inline]
    pub fn pc(&self) -> u32 {
        self.pc
    }

    /// Set the program counter directly (debugger use).
    #[inline]
    pub fn set_pc(&mut self, pc: u32) {
        self.pc = pc;
    }

    /// Next program counter.
    #[inline]
    pub fn npc(&self) -> u32 {
        self.npc
    }

    /// Write the branch target. Bodies of taken branches call this; the
    /// transfer becomes visible only after the delay slot retires.
    #[inline]
    pub fn set_npc(&mut self, target: u32) {
        self.npc = target;
    }

    /// The shared instruction prologue: `pc = npc; npc = pc + 4`.
    #[inline]
    pub fn advance(&mut self) {
        self.pc = self.npc;
        self.npc = self.pc.wrapping_add(4);
    }
}

impl std::fmt::Debug for CpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpuContext")
            .field("pc", &format_args!("0x{:08X}", self.pc))
            .field("npc", &format_args!("0x{:08X}", self.npc))
            .field("hi", &format_args!("0x{:08X}", self.hi))
            .field("lo", &format_args!("0x{:08X}", self.lo))
            .field("cc", &self.cc)
            .field("retired", &self.retired)
            .field("halted", &self.halted)
            .field("gpr", &self.gpr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_state() {
        let mut ctx = CpuContext::new();
        ctx.gpr.write(5, 99);
        ctx.hi = 1;
        ctx.lo = 2;
        ctx.cc = true;
        ctx.retired = 10;

        ctx.reset(0x1000);

        assert_eq!(ctx.gpr.read(5), 0);
        assert_eq!(ctx.hi, 0);
        assert_eq!(ctx.lo, 0);
        assert!(!ctx.cc);
        assert_eq!(ctx.pc(), 0x1000);
        assert_eq!(ctx.npc(), 0x1004);
        assert_eq!(ctx.retired, 0);
        assert!(!ctx.halted);
    }

    #[test]
    fn test_advance_protocol() {
        let mut ctx = CpuContext::new();
        ctx.reset(0x1000);

        // First instruction: body sees pc = fetch + 4
        ctx.advance();
        assert_eq!(ctx.pc(), 0x1004);
        assert_eq!(ctx.npc(), 0x1008);

        // Branch body redirects npc only
        ctx.set_npc(0x2000);
        assert_eq!(ctx.pc(), 0x1004);

        // Delay slot retires, then control reaches the target
        ctx.advance();
        assert_eq!(ctx.pc(), 0x2000);
        assert_eq!(ctx.npc(), 0x2004);
    }
}
