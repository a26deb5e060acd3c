//! Guest process bootstrap.
//!
//! Builds the initial stack image a Linux kernel would leave for a freshly
//! exec'd o32 process, before the first instruction is fetched:
//!
//! ```text
//! higher addresses   argument byte strings   (ARG_BLOCK_SIZE budget)
//!                    AT_NULL
//!                    page size value
//!                    AT_PAGESZ
//!                    0                       (envp terminator)
//!                    0                       (argv terminator)
//!                    argv[argc-1]
//!                    ...
//!                    argv[0]
//! lower addresses    argc                    <- $sp
//! ```
//!
//! Registers are then primed: `$a0 = argc`, `$a1 = &argv[0]`, `$sp` at the
//! word image. Each process instance gets its own stack slot below the top
//! of guest memory so several guests can share one address space; the slot
//! counter is a field on the builder, not process-wide state.

use thiserror::Error;

use crate::cpu::context::{abi, CpuContext};
use crate::memory::MemoryPort;
use crate::syscall::{write_buffer, write_words};

/// Byte budget for the aggregate argument strings (terminators included).
pub const ARG_BLOCK_SIZE: u32 = 512;

/// Stack slot reserved per process instance.
pub const STACK_SLOT_SIZE: u32 = 64 * 1024;

/// `AT_PAGESZ` auxiliary vector tag.
const AT_PAGESZ: u32 = 6;

/// `AT_NULL` auxiliary vector tag.
const AT_NULL: u32 = 0;

/// Page size reported through `AT_PAGESZ`.
const PAGE_SIZE: u32 = 4096;

/// Bootstrap failures; all fatal before the first instruction executes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BootError {
    /// The argv strings do not fit the fixed block.
    #[error("argument strings need {needed} bytes, budget is {limit}")]
    ArgStringsTooLarge {
        /// Bytes the strings would occupy.
        needed: usize,
        /// The fixed budget.
        limit: u32,
    },
}

/// Addresses chosen for one bootstrapped process, mostly for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessImage {
    /// Base of the argument string table.
    pub string_table: u32,
    /// Initial stack pointer (base of the word image).
    pub stack_pointer: u32,
    /// Address of `argv[0]` within the word image.
    pub argv_base: u32,
    /// Slot index this process occupies.
    pub slot: u32,
}

/// Builds initial process images, one stack slot per call.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    ram_end: u32,
    next_slot: u32,
}

impl ProcessBuilder {
    /// Create a builder laying out images below `ram_end` (usually the
    /// guest memory size).
    pub fn new(ram_end: u32) -> Self {
        Self {
            ram_end,
            next_slot: 0,
        }
    }

    /// Build the stack image for one process and prime its registers.
    ///
    /// Not re-entrant per process: call exactly once before execution
    /// starts. Consecutive calls place each image in its own slot.
    pub fn build<M: MemoryPort>(
        &mut self,
        args: &[&str],
        ctx: &mut CpuContext,
        mem: &mut M,
    ) -> Result<ProcessImage, BootError> {
        let argc = args.len() as u32;
        let string_table = self.ram_end - ARG_BLOCK_SIZE - self.next_slot * STACK_SLOT_SIZE;

        // argc + argv pointers + two terminators + the three auxv words
        let mut words = Vec::with_capacity(args.len() + 6);
        let mut strings: Vec<u8> = Vec::new();

        words.push(argc);
        for arg in args {
            let needed = strings.len() + arg.len() + 1;
            if needed > ARG_BLOCK_SIZE as usize {
                return Err(BootError::ArgStringsTooLarge {
                    needed,
                    limit: ARG_BLOCK_SIZE,
                });
            }
            words.push(string_table + strings.len() as u32);
            strings.extend_from_slice(arg.as_bytes());
            strings.push(0);
        }
        words.push(0); // argv terminator
        words.push(0); // envp terminator
        words.push(AT_PAGESZ);
        words.push(PAGE_SIZE);
        words.push(AT_NULL);

        let stack_pointer = string_table - (words.len() as u32) * 4;
        write_buffer(mem, string_table, &strings);
        write_words(mem, stack_pointer, &words);

        ctx.gpr.write(abi::SP, stack_pointer);
        ctx.gpr.write(abi::A0, argc);
        ctx.gpr.write(abi::A1, stack_pointer + 4);

        let image = ProcessImage {
            string_table,
            stack_pointer,
            argv_base: stack_pointer + 4,
            slot: self.next_slot,
        };
        log::debug!(
            "bootstrapped process slot {}: sp={:#010x} argc={}",
            image.slot,
            image.stack_pointer,
            argc
        );
        self.next_slot += 1;
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Endianness, GuestMemory};
    use crate::syscall::read_cstring;

    const RAM_END: u32 = 0x10_0000;

    fn setup() -> (ProcessBuilder, CpuContext, GuestMemory) {
        (
            ProcessBuilder::new(RAM_END),
            CpuContext::new(),
            GuestMemory::new(RAM_END, Endianness::Big),
        )
    }

    #[test]
    fn test_two_arg_layout() {
        let (mut builder, mut ctx, mut mem) = setup();
        let image = builder.build(&["prog", "x"], &mut ctx, &mut mem).unwrap();

        // Register priming
        assert_eq!(ctx.gpr.read(abi::A0), 2);
        assert_eq!(ctx.gpr.read(abi::SP), image.stack_pointer);
        assert_eq!(ctx.gpr.read(abi::A1), image.stack_pointer + 4);

        // First word of the image is argc
        assert_eq!(mem.read_word(image.stack_pointer), 2);

        // argv pointers resolve to the strings
        let argv0 = mem.read_word(image.argv_base);
        let argv1 = mem.read_word(image.argv_base + 4);
        assert_eq!(read_cstring(&mem, argv0), b"prog");
        assert_eq!(read_cstring(&mem, argv1), b"x");

        // Terminators and auxv: [0, 0, AT_PAGESZ, 4096, AT_NULL]
        let tail = image.argv_base + 8;
        assert_eq!(mem.read_word(tail), 0);
        assert_eq!(mem.read_word(tail + 4), 0);
        assert_eq!(mem.read_word(tail + 8), 6);
        assert_eq!(mem.read_word(tail + 12), 4096);
        assert_eq!(mem.read_word(tail + 16), 0);

        // Word image sits directly below the string table
        assert_eq!(image.string_table - image.stack_pointer, (2 + 6) * 4);
    }

    #[test]
    fn test_slot_offsets_separate_processes() {
        let (mut builder, mut ctx, mut mem) = setup();
        let first = builder.build(&["a"], &mut ctx, &mut mem).unwrap();
        let second = builder.build(&["b"], &mut ctx, &mut mem).unwrap();

        assert_eq!(first.slot, 0);
        assert_eq!(second.slot, 1);
        assert_eq!(
            first.string_table - second.string_table,
            STACK_SLOT_SIZE
        );
        // Both images remain intact
        assert_eq!(read_cstring(&mem, mem.read_word(first.argv_base)), b"a");
        assert_eq!(read_cstring(&mem, mem.read_word(second.argv_base)), b"b");
    }

    #[test]
    fn test_oversized_args_fail() {
        let (mut builder, mut ctx, mut mem) = setup();
        let big = "x".repeat(600);
        let err = builder.build(&[&big], &mut ctx, &mut mem).unwrap_err();
        assert!(matches!(err, BootError::ArgStringsTooLarge { .. }));
    }

    #[test]
    fn test_budget_counts_terminators() {
        let (mut builder, mut ctx, mut mem) = setup();
        // 511 bytes + NUL fits exactly; 512 + NUL does not
        let fits = "x".repeat(511);
        assert!(builder.build(&[&fits], &mut ctx, &mut mem).is_ok());

        let too_big = "x".repeat(512);
        assert!(builder.build(&[&too_big], &mut ctx, &mut mem).is_err());
    }

    #[test]
    fn test_empty_argv() {
        let (mut builder, mut ctx, mut mem) = setup();
        let image = builder.build(&[], &mut ctx, &mut mem).unwrap();
        assert_eq!(mem.read_word(image.stack_pointer), 0);
        assert_eq!(mem.read_word(image.argv_base), 0); // argv terminator
    }
}
