//! Simulated MIPS-I hart.
//!
//! [`Cpu`] couples the architectural state ([`CpuContext`]) with the
//! syscall emulation layer and drives the retire loop. Fetch and decode
//! stay outside: [`Cpu::step`] takes the already-decoded instruction for
//! the address in `pc`, and [`Cpu::run`] pulls instructions from a caller
//! fetch function.
//!
//! Fatal conditions (arithmetic trap, `break`, `teq`) come back as values;
//! the driver decides whether the host process lives on.

pub mod context;
pub mod debug;
pub mod registers;

pub use context::{abi, CpuContext};
pub use registers::{FpuFile, GprFile};

use crate::isa::{self, ExecuteResult, Instr, Trap};
use crate::memory::MemoryPort;
use crate::syscall::SyscallEmu;

/// Result of retiring a single instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// Continue with the instruction at `pc`.
    Continue,
    /// The guest exited.
    Exited {
        /// Guest exit code.
        code: i32,
    },
    /// A fatal trap ended the simulated process.
    Trapped(Trap),
}

/// Why [`Cpu::run`] returned.
#[derive(Debug, Clone, PartialEq)]
pub enum RunExit {
    /// The guest exited.
    Exited {
        /// Guest exit code.
        code: i32,
    },
    /// A fatal trap ended the simulated process.
    Trapped(Trap),
    /// The fetch function had no instruction for `pc`.
    OutOfProgram {
        /// The unfetchable address.
        pc: u32,
    },
    /// The step budget ran out first.
    StepLimit,
}

/// One simulated hart: architectural state plus the syscall layer.
#[derive(Debug, Clone)]
pub struct Cpu {
    /// Architectural state.
    pub ctx: CpuContext,
    /// o32 syscall emulation state.
    pub sys: SyscallEmu,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    /// Create a hart with zeroed state.
    pub fn new() -> Self {
        Self {
            ctx: CpuContext::new(),
            sys: SyscallEmu::new(),
        }
    }

    /// Reset the architectural state and start execution at `entry`.
    pub fn reset(&mut self, entry: u32) {
        self.ctx.reset(entry);
        log::info!("cpu reset, entry {:#010x}", entry);
    }

    /// Retire one instruction.
    ///
    /// `instr` must be the decoded instruction at the current `pc`. The
    /// shared prologue advances `pc`/`npc` before the opcode body runs, so
    /// after this call `pc` is the next fetch address (the delay-slot
    /// contract; see [`context`]).
    pub fn step<M: MemoryPort>(&mut self, instr: &Instr, mem: &mut M) -> StepResult {
        log::trace!(
            "----- pc={:#010x} ----- {} {:?}",
            self.ctx.pc(),
            self.ctx.retired,
            instr
        );
        self.ctx.advance();
        self.ctx.retired += 1;

        match isa::execute(instr, &mut self.ctx, mem, &mut self.sys) {
            ExecuteResult::Continue => StepResult::Continue,
            ExecuteResult::Exit { code } => {
                self.ctx.halted = true;
                log::info!(
                    "guest exited with code {} after {} instructions",
                    code,
                    self.ctx.retired
                );
                StepResult::Exited { code }
            }
            ExecuteResult::Trap(trap) => {
                self.ctx.halted = true;
                log::error!("{}", trap);
                StepResult::Trapped(trap)
            }
        }
    }

    /// Run until exit, trap, fetch failure or `max_steps` instructions.
    ///
    /// `fetch` maps a `pc` to its decoded instruction; returning `None`
    /// stops the run (control left the supplied program).
    pub fn run<M, F>(&mut self, mem: &mut M, mut fetch: F, max_steps: u64) -> RunExit
    where
        M: MemoryPort,
        F: FnMut(u32) -> Option<Instr>,
    {
        for _ in 0..max_steps {
            let pc = self.ctx.pc();
            let instr = match fetch(pc) {
                Some(i) => i,
                None => return RunExit::OutOfProgram { pc },
            };
            match self.step(&instr, mem) {
                StepResult::Continue => {}
                StepResult::Exited { code } => return RunExit::Exited { code },
                StepResult::Trapped(trap) => return RunExit::Trapped(trap),
            }
        }
        RunExit::StepLimit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Endianness, GuestMemory};
    use std::collections::BTreeMap;

    fn machine() -> (Cpu, GuestMemory) {
        let mut cpu = Cpu::new();
        cpu.reset(0x1000);
        (cpu, GuestMemory::new(0x1_0000, Endianness::Big))
    }

    fn run_program(
        cpu: &mut Cpu,
        mem: &mut GuestMemory,
        program: &[(u32, Instr)],
        max_steps: u64,
    ) -> RunExit {
        let map: BTreeMap<u32, Instr> = program.iter().cloned().collect();
        cpu.run(mem, |pc| map.get(&pc).cloned(), max_steps)
    }

    #[test]
    fn test_straight_line_execution() {
        let (mut cpu, mut mem) = machine();
        let exit = run_program(
            &mut cpu,
            &mut mem,
            &[
                (0x1000, Instr::Ori { rt: 1, rs: 0, imm: 7 }),
                (0x1004, Instr::Ori { rt: 2, rs: 0, imm: 8 }),
                (0x1008, Instr::Addu { rd: 3, rs: 1, rt: 2 }),
            ],
            10,
        );
        assert_eq!(exit, RunExit::OutOfProgram { pc: 0x100C });
        assert_eq!(cpu.ctx.gpr.read(3), 15);
        assert_eq!(cpu.ctx.retired, 3);
    }

    #[test]
    fn test_delay_slot_executes_on_taken_branch() {
        let (mut cpu, mut mem) = machine();
        // beq at 0x1000 (taken), delay slot at 0x1004, target at 0x1010
        let exit = run_program(
            &mut cpu,
            &mut mem,
            &[
                (0x1000, Instr::Beq { rs: 0, rt: 0, offset: 3 }),
                (0x1004, Instr::Ori { rt: 9, rs: 0, imm: 0x55 }),
                (0x1008, Instr::Ori { rt: 10, rs: 0, imm: 0xBAD }),
                (0x1010, Instr::Ori { rt: 11, rs: 0, imm: 0x77 }),
            ],
            10,
        );
        assert_eq!(exit, RunExit::OutOfProgram { pc: 0x1014 });
        // Delay slot ran, skipped instruction did not, target ran
        assert_eq!(cpu.ctx.gpr.read(9), 0x55);
        assert_eq!(cpu.ctx.gpr.read(10), 0);
        assert_eq!(cpu.ctx.gpr.read(11), 0x77);
    }

    #[test]
    fn test_delay_slot_executes_on_jump() {
        let (mut cpu, mut mem) = machine();
        let exit = run_program(
            &mut cpu,
            &mut mem,
            &[
                (0x1000, Instr::J { target: 0x1020 >> 2 }),
                (0x1004, Instr::Ori { rt: 9, rs: 0, imm: 1 }),
                (0x1020, Instr::Ori { rt: 10, rs: 0, imm: 2 }),
            ],
            10,
        );
        assert_eq!(exit, RunExit::OutOfProgram { pc: 0x1024 });
        assert_eq!(cpu.ctx.gpr.read(9), 1);
        assert_eq!(cpu.ctx.gpr.read(10), 2);
    }

    #[test]
    fn test_exit_syscall_stops_run() {
        let (mut cpu, mut mem) = machine();
        let exit = run_program(
            &mut cpu,
            &mut mem,
            &[
                (0x1000, Instr::Ori { rt: 2, rs: 0, imm: 4001 }), // NR_exit
                (0x1004, Instr::Ori { rt: 4, rs: 0, imm: 42 }),
                (0x1008, Instr::Syscall { code: 0 }),
            ],
            10,
        );
        assert_eq!(exit, RunExit::Exited { code: 42 });
        assert!(cpu.ctx.halted);
    }

    #[test]
    fn test_trap_stops_run() {
        let (mut cpu, mut mem) = machine();
        let exit = run_program(
            &mut cpu,
            &mut mem,
            &[(0x1000, Instr::Break { code: 0 })],
            10,
        );
        assert!(matches!(exit, RunExit::Trapped(Trap::Breakpoint { .. })));
        assert!(cpu.ctx.halted);
    }

    #[test]
    fn test_teq_traps_only_on_equal() {
        let (mut cpu, mut mem) = machine();
        cpu.ctx.gpr.write(1, 1);
        let exit = run_program(
            &mut cpu,
            &mut mem,
            &[
                (0x1000, Instr::Teq { rs: 1, rt: 2 }), // 1 != 0: no trap
                (0x1004, Instr::Teq { rs: 1, rt: 1 }), // equal: trap
            ],
            10,
        );
        assert!(matches!(exit, RunExit::Trapped(Trap::TrapOnEqual { .. })));
        assert_eq!(cpu.ctx.retired, 2);
    }

    #[test]
    fn test_step_limit() {
        let (mut cpu, mut mem) = machine();
        // Tight loop: j to self with nop in the slot
        let exit = run_program(
            &mut cpu,
            &mut mem,
            &[
                (0x1000, Instr::J { target: 0x1000 >> 2 }),
                (0x1004, Instr::Nop),
            ],
            100,
        );
        assert_eq!(exit, RunExit::StepLimit);
        assert_eq!(cpu.ctx.retired, 100);
    }

    #[test]
    fn test_memory_program() {
        let (mut cpu, mut mem) = machine();
        mem.write_word(0x2000, 0x1234_5678);
        let exit = run_program(
            &mut cpu,
            &mut mem,
            &[
                (0x1000, Instr::Ori { rt: 8, rs: 0, imm: 0x2000 }),
                (0x1004, Instr::Lw { rt: 1, base: 8, offset: 0 }),
                (0x1008, Instr::Sw { rt: 1, base: 8, offset: 4 }),
            ],
            10,
        );
        assert_eq!(exit, RunExit::OutOfProgram { pc: 0x100C });
        assert_eq!(mem.read_word(0x2004), 0x1234_5678);
    }
}
