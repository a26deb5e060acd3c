//! Linux o32 syscall emulation.
//!
//! Translates guest syscalls into host operations. The o32 convention:
//! the syscall number arrives in `$v0` (or embedded in the instruction for
//! the immediate-coded form), up to four arguments in `$a0`-`$a3`, the
//! result goes back in `$v0` and `$a3` carries the error flag (1 when the
//! result word is negative).
//!
//! Guest pointers are marshaled through the memory port byte by byte
//! ([`read_buffer`]/[`write_buffer`]); word-array arguments (the bootstrap
//! stack image, `timeval`) use [`write_words`], which composes each word in
//! guest byte order instead of copying raw bytes. Picking the wrong form
//! for a syscall's argument layout corrupts data, so the split is explicit.
//!
//! Host execution goes through the `libc` crate. Unimplemented numbers are
//! reported (caller address, number) and complete with `-1`/error-flag set
//! so the guest sees a failed syscall instead of the host dying.

pub mod numbers;

use std::ffi::CString;

use crate::cpu::context::{abi, CpuContext};
use crate::isa::ExecuteResult;
use crate::memory::MemoryPort;

/// Maximum single-transfer size accepted from guest `read`/`write` counts.
/// A wild count from a corrupted guest should not OOM the host.
const MAX_IO_CHUNK: u32 = 16 * 1024 * 1024;

// ---- guest buffer marshaling ----

/// Copy `size` bytes out of guest memory.
pub fn read_buffer<M: MemoryPort>(mem: &M, addr: u32, size: u32) -> Vec<u8> {
    (0..size)
        .map(|i| mem.read_byte(addr.wrapping_add(i)))
        .collect()
}

/// Copy a byte buffer into guest memory.
pub fn write_buffer<M: MemoryPort>(mem: &mut M, addr: u32, bytes: &[u8]) {
    for (i, b) in bytes.iter().enumerate() {
        mem.write_byte(addr.wrapping_add(i as u32), *b);
    }
}

/// Write a word array into guest memory in guest byte order.
pub fn write_words<M: MemoryPort>(mem: &mut M, addr: u32, words: &[u32]) {
    for (i, w) in words.iter().enumerate() {
        mem.write_word(addr.wrapping_add((i * 4) as u32), *w);
    }
}

/// Read a NUL-terminated string from guest memory (terminator excluded).
pub fn read_cstring<M: MemoryPort>(mem: &M, addr: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut a = addr;
    loop {
        let b = mem.read_byte(a);
        if b == 0 {
            return bytes;
        }
        bytes.push(b);
        a = a.wrapping_add(1);
    }
}

// ---- flag translation ----

/// Guest (Linux-MIPS, octal) open-flag bit -> host open flag.
///
/// Bits without a known mapping (`O_DIRECTORY`, `O_CLOEXEC`, ...) are
/// silently dropped; `O_RDONLY` is the zero value on both sides.
const OPEN_FLAG_MAP: &[(u32, i32)] = &[
    (0o1, libc::O_WRONLY),
    (0o2, libc::O_RDWR),
    (0o10, libc::O_APPEND),
    (0o1000, libc::O_CREAT),
    (0o2000, libc::O_TRUNC),
    (0o4000, libc::O_EXCL),
    (0o20000, libc::O_SYNC),
    (0o40000, libc::O_NONBLOCK),
    (0o100000, libc::O_NOCTTY),
];

/// Translate guest `open()` flags bit-by-bit to host constants.
pub fn translate_open_flags(guest: u32) -> i32 {
    OPEN_FLAG_MAP
        .iter()
        .filter(|(bit, _)| guest & bit != 0)
        .fold(0, |acc, &(_, host)| acc | host)
}

/// `MAP_ANONYMOUS` in the guest's mmap flag encoding.
#[inline]
fn is_mmap_anonymous(flags: u32) -> bool {
    flags & 0x800 != 0
}

/// Outcome of one dispatched syscall.
enum Dispatch {
    /// Result word for `$v0`.
    Value(i32),
    /// Guest termination request.
    Exit(i32),
    /// Number has no handler.
    Unimplemented,
}

/// o32 syscall emulation state.
///
/// The program break and the anonymous-mmap cursor are the only pieces of
/// state the dispatcher keeps between calls; everything else is handed to
/// the host each time.
#[derive(Debug, Clone)]
pub struct SyscallEmu {
    /// Current program break (`brk`).
    brk: u32,
    /// Next address handed out for anonymous mappings.
    mmap_next: u32,
}

impl Default for SyscallEmu {
    fn default() -> Self {
        Self::new()
    }
}

impl SyscallEmu {
    /// Default program break, above a typical small program image.
    const DEFAULT_BRK: u32 = 0x0010_0000;

    /// Default base for anonymous mappings, above the break growth area.
    const DEFAULT_MMAP_BASE: u32 = 0x0080_0000;

    /// Create the emulation state with default memory layout.
    pub fn new() -> Self {
        Self {
            brk: Self::DEFAULT_BRK,
            mmap_next: Self::DEFAULT_MMAP_BASE,
        }
    }

    /// Place the initial program break (call after loading the image).
    pub fn set_program_break(&mut self, brk: u32) {
        self.brk = brk;
    }

    /// Current program break.
    pub fn program_break(&self) -> u32 {
        self.brk
    }

    /// Entry point for the `syscall` instruction.
    ///
    /// `code` zero means the o32 register form (number in `$v0`); a
    /// non-zero trap code is the number itself. Both forms share the
    /// dispatch and the `$v0`/`$a3` epilogue.
    pub fn handle_syscall<M: MemoryPort>(
        &mut self,
        code: u32,
        ctx: &mut CpuContext,
        mem: &mut M,
    ) -> ExecuteResult {
        let number = if code == 0 {
            ctx.gpr.read(abi::V0)
        } else {
            code
        };
        log::trace!(
            "syscall {} at pc {:#010x} args=[{:#x}, {:#x}, {:#x}, {:#x}]",
            number,
            ctx.pc(),
            ctx.gpr.read(4),
            ctx.gpr.read(5),
            ctx.gpr.read(6),
            ctx.gpr.read(7),
        );

        match self.dispatch(number, ctx, mem) {
            Dispatch::Exit(code) => return ExecuteResult::Exit { code },
            Dispatch::Value(v) => ctx.gpr.write(abi::V0, v as u32),
            Dispatch::Unimplemented => {
                log::warn!(
                    "unimplemented syscall {} ({:#x}), caller address {:#010x}",
                    number,
                    number,
                    ctx.pc(),
                );
                ctx.gpr.write(abi::V0, -1i32 as u32);
            }
        }

        // o32 a3 error flag: set iff the result word is negative
        let failed = (ctx.gpr.read(abi::V0) as i32) < 0;
        ctx.gpr.write(abi::A3, failed as u32);
        ExecuteResult::Continue
    }

    fn dispatch<M: MemoryPort>(
        &mut self,
        number: u32,
        ctx: &mut CpuContext,
        mem: &mut M,
    ) -> Dispatch {
        use numbers::*;

        let ret = match number {
            NR_EXIT | NR_EXIT_GROUP => return Dispatch::Exit(arg(ctx, 0) as i32),
            NR_READ => self.sys_read(ctx, mem),
            NR_WRITE => self.sys_write(ctx, mem),
            NR_OPEN => self.sys_open(ctx, mem),
            NR_CLOSE => self.sys_close(ctx),
            NR_CREAT => self.sys_creat(ctx, mem),
            NR_LSEEK => self.sys_lseek(ctx),
            NR_UNLINK => self.sys_unlink(ctx, mem),
            NR_ACCESS => self.sys_access(ctx, mem),
            NR_DUP => self.sys_dup(ctx),
            NR_GETPID => unsafe { libc::getpid() },
            NR_GETUID => unsafe { libc::getuid() as i32 },
            NR_GETEUID => unsafe { libc::geteuid() as i32 },
            NR_GETGID => unsafe { libc::getgid() as i32 },
            NR_GETEGID => unsafe { libc::getegid() as i32 },
            NR_BRK => self.sys_brk(ctx),
            NR_MMAP | NR_MMAP2 => self.sys_mmap(ctx),
            NR_TIME => self.sys_time(ctx, mem),
            NR_GETTIMEOFDAY => self.sys_gettimeofday(ctx, mem),
            _ => return Dispatch::Unimplemented,
        };
        Dispatch::Value(ret)
    }

    // ---- file I/O ----

    fn sys_read<M: MemoryPort>(&self, ctx: &CpuContext, mem: &mut M) -> i32 {
        let fd = arg(ctx, 0) as i32;
        let addr = arg(ctx, 1);
        let count = arg(ctx, 2).min(MAX_IO_CHUNK);

        let mut buf = vec![0u8; count as usize];
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n > 0 {
            write_buffer(mem, addr, &buf[..n as usize]);
        }
        n as i32
    }

    fn sys_write<M: MemoryPort>(&self, ctx: &CpuContext, mem: &M) -> i32 {
        let fd = arg(ctx, 0) as i32;
        let count = arg(ctx, 2).min(MAX_IO_CHUNK);
        let buf = read_buffer(mem, arg(ctx, 1), count);

        let n = unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) };
        n as i32
    }

    fn sys_open<M: MemoryPort>(&self, ctx: &CpuContext, mem: &M) -> i32 {
        let path = match CString::new(read_cstring(mem, arg(ctx, 0))) {
            Ok(p) => p,
            Err(_) => return -1,
        };
        let flags = translate_open_flags(arg(ctx, 1));
        let mode = arg(ctx, 2) as libc::c_uint;
        unsafe { libc::open(path.as_ptr(), flags, mode) }
    }

    fn sys_creat<M: MemoryPort>(&self, ctx: &CpuContext, mem: &M) -> i32 {
        let path = match CString::new(read_cstring(mem, arg(ctx, 0))) {
            Ok(p) => p,
            Err(_) => return -1,
        };
        unsafe { libc::creat(path.as_ptr(), arg(ctx, 1) as libc::mode_t) }
    }

    fn sys_close(&self, ctx: &CpuContext) -> i32 {
        let fd = arg(ctx, 0) as i32;
        // The guest shares the host's stdio descriptors; closing them out
        // from under the host would be unrecoverable.
        if fd <= 2 {
            return 0;
        }
        unsafe { libc::close(fd) }
    }

    fn sys_lseek(&self, ctx: &CpuContext) -> i32 {
        let fd = arg(ctx, 0) as i32;
        let offset = arg(ctx, 1) as i32 as libc::off_t;
        let whence = arg(ctx, 2) as i32;
        unsafe { libc::lseek(fd, offset, whence) as i32 }
    }

    fn sys_unlink<M: MemoryPort>(&self, ctx: &CpuContext, mem: &M) -> i32 {
        let path = match CString::new(read_cstring(mem, arg(ctx, 0))) {
            Ok(p) => p,
            Err(_) => return -1,
        };
        unsafe { libc::unlink(path.as_ptr()) }
    }

    fn sys_access<M: MemoryPort>(&self, ctx: &CpuContext, mem: &M) -> i32 {
        let path = match CString::new(read_cstring(mem, arg(ctx, 0))) {
            Ok(p) => p,
            Err(_) => return -1,
        };
        unsafe { libc::access(path.as_ptr(), arg(ctx, 1) as i32) }
    }

    fn sys_dup(&self, ctx: &CpuContext) -> i32 {
        unsafe { libc::dup(arg(ctx, 0) as i32) }
    }

    // ---- process memory ----

    fn sys_brk(&mut self, ctx: &CpuContext) -> i32 {
        let requested = arg(ctx, 0);
        if requested != 0 {
            self.brk = requested;
        }
        self.brk as i32
    }

    /// Anonymous private mappings only: hand out guest pages from a bump
    /// cursor. File-backed mappings are not supported and fail.
    fn sys_mmap(&mut self, ctx: &CpuContext) -> i32 {
        let length = arg(ctx, 1);
        let flags = arg(ctx, 3);
        if !is_mmap_anonymous(flags) || length == 0 {
            return -1;
        }
        let base = self.mmap_next;
        let pages = length.div_ceil(4096);
        self.mmap_next = self.mmap_next.wrapping_add(pages * 4096);
        base as i32
    }

    // ---- clocks ----

    fn sys_time<M: MemoryPort>(&self, ctx: &CpuContext, mem: &mut M) -> i32 {
        let t = unsafe { libc::time(std::ptr::null_mut()) };
        let out = arg(ctx, 0);
        if out != 0 {
            mem.write_word(out, t as u32);
        }
        t as i32
    }

    fn sys_gettimeofday<M: MemoryPort>(&self, ctx: &CpuContext, mem: &mut M) -> i32 {
        let mut tv = libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        let ret = unsafe { libc::gettimeofday(&mut tv, std::ptr::null_mut()) };
        let out = arg(ctx, 0);
        if ret == 0 && out != 0 {
            write_words(mem, out, &[tv.tv_sec as u32, tv.tv_usec as u32]);
        }
        ret
    }
}

/// Fetch syscall argument `n` from `$a0 + n`.
#[inline]
fn arg(ctx: &CpuContext, n: u8) -> u32 {
    ctx.gpr.read(abi::A0 + n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Endianness, GuestMemory};

    fn setup() -> (SyscallEmu, CpuContext, GuestMemory) {
        let mut ctx = CpuContext::new();
        ctx.reset(0x1000);
        ctx.advance();
        (
            SyscallEmu::new(),
            ctx,
            GuestMemory::new(0x1_0000, Endianness::Big),
        )
    }

    fn temp_path(tag: &str) -> String {
        format!("/tmp/mips_emu_{}_{}", tag, std::process::id())
    }

    // ========== marshaling ==========

    #[test]
    fn test_buffer_round_trip() {
        let (_, _, mut mem) = setup();
        write_buffer(&mut mem, 0x100, b"hello");
        assert_eq!(read_buffer(&mem, 0x100, 5), b"hello");
    }

    #[test]
    fn test_write_words_uses_guest_byte_order() {
        let (_, _, mut mem) = setup();
        write_words(&mut mem, 0x200, &[0x1122_3344, 7]);
        assert_eq!(mem.read_word(0x200), 0x1122_3344);
        assert_eq!(mem.read_byte(0x200), 0x11); // big-endian layout
        assert_eq!(mem.read_word(0x204), 7);
    }

    #[test]
    fn test_read_cstring_stops_at_nul() {
        let (_, _, mut mem) = setup();
        write_buffer(&mut mem, 0x300, b"abc\0junk");
        assert_eq!(read_cstring(&mem, 0x300), b"abc");
    }

    // ========== flag translation ==========

    #[test]
    fn test_open_flag_translation() {
        assert_eq!(translate_open_flags(0), 0); // O_RDONLY
        assert_eq!(translate_open_flags(0o1), libc::O_WRONLY);
        assert_eq!(
            translate_open_flags(0o1000 | 0o2000 | 0o1),
            libc::O_CREAT | libc::O_TRUNC | libc::O_WRONLY
        );
        assert_eq!(translate_open_flags(0o10), libc::O_APPEND);
    }

    #[test]
    fn test_unmapped_open_flags_dropped() {
        // O_DIRECTORY-class bits have no mapping and must vanish
        assert_eq!(translate_open_flags(0o200000), 0);
        assert_eq!(
            translate_open_flags(0o200000 | 0o2),
            libc::O_RDWR
        );
    }

    // ========== dispatch and error flag ==========

    #[test]
    fn test_unmapped_syscall_sets_error_flag() {
        let (mut sys, mut ctx, mut mem) = setup();
        let result = sys.handle_syscall(9999, &mut ctx, &mut mem);
        assert_eq!(result, ExecuteResult::Continue);
        assert_eq!(ctx.gpr.read(abi::V0), 0xFFFF_FFFF);
        assert_eq!(ctx.gpr.read(abi::A3), 1);
    }

    #[test]
    fn test_register_form_reads_number_from_v0() {
        let (mut sys, mut ctx, mut mem) = setup();
        ctx.gpr.write(abi::V0, numbers::NR_GETPID);
        sys.handle_syscall(0, &mut ctx, &mut mem);
        assert_eq!(ctx.gpr.read(abi::V0), std::process::id());
        assert_eq!(ctx.gpr.read(abi::A3), 0);
    }

    #[test]
    fn test_exit_terminates() {
        let (mut sys, mut ctx, mut mem) = setup();
        ctx.gpr.write(abi::A0, 3);
        let result = sys.handle_syscall(numbers::NR_EXIT, &mut ctx, &mut mem);
        assert_eq!(result, ExecuteResult::Exit { code: 3 });

        let result = sys.handle_syscall(numbers::NR_EXIT_GROUP, &mut ctx, &mut mem);
        assert_eq!(result, ExecuteResult::Exit { code: 3 });
    }

    #[test]
    fn test_brk_tracks_break() {
        let (mut sys, mut ctx, mut mem) = setup();
        ctx.gpr.write(abi::A0, 0);
        sys.handle_syscall(numbers::NR_BRK, &mut ctx, &mut mem);
        let initial = ctx.gpr.read(abi::V0);

        ctx.gpr.write(abi::A0, initial + 0x2000);
        sys.handle_syscall(numbers::NR_BRK, &mut ctx, &mut mem);
        assert_eq!(ctx.gpr.read(abi::V0), initial + 0x2000);
        assert_eq!(sys.program_break(), initial + 0x2000);
    }

    #[test]
    fn test_anonymous_mmap_allocates_pages() {
        let (mut sys, mut ctx, mut mem) = setup();
        ctx.gpr.write(4, 0); // addr hint
        ctx.gpr.write(5, 5000); // length
        ctx.gpr.write(6, 3); // prot
        ctx.gpr.write(7, 0x802); // MAP_PRIVATE | MAP_ANONYMOUS (guest bits)
        sys.handle_syscall(numbers::NR_MMAP2, &mut ctx, &mut mem);
        let first = ctx.gpr.read(abi::V0);
        assert_ne!(first, 0xFFFF_FFFF);
        assert_eq!(first % 4096, 0);

        sys.handle_syscall(numbers::NR_MMAP2, &mut ctx, &mut mem);
        let second = ctx.gpr.read(abi::V0);
        assert_eq!(second, first + 2 * 4096); // 5000 bytes -> two pages
    }

    #[test]
    fn test_file_backed_mmap_fails() {
        let (mut sys, mut ctx, mut mem) = setup();
        ctx.gpr.write(5, 4096);
        ctx.gpr.write(7, 0x2); // MAP_PRIVATE, no MAP_ANONYMOUS
        sys.handle_syscall(numbers::NR_MMAP2, &mut ctx, &mut mem);
        assert_eq!(ctx.gpr.read(abi::V0), 0xFFFF_FFFF);
        assert_eq!(ctx.gpr.read(abi::A3), 1);
    }

    #[test]
    fn test_time_returns_and_stores() {
        let (mut sys, mut ctx, mut mem) = setup();
        ctx.gpr.write(abi::A0, 0x400);
        sys.handle_syscall(numbers::NR_TIME, &mut ctx, &mut mem);
        let ret = ctx.gpr.read(abi::V0);
        assert!(ret > 0);
        assert_eq!(mem.read_word(0x400), ret);
        assert_eq!(ctx.gpr.read(abi::A3), 0);
    }

    #[test]
    fn test_gettimeofday_writes_word_pair() {
        let (mut sys, mut ctx, mut mem) = setup();
        ctx.gpr.write(abi::A0, 0x500);
        sys.handle_syscall(numbers::NR_GETTIMEOFDAY, &mut ctx, &mut mem);
        assert_eq!(ctx.gpr.read(abi::V0), 0);
        assert!(mem.read_word(0x500) > 0); // seconds
    }

    // ========== host file I/O through the dispatcher ==========

    #[test]
    fn test_open_write_read_round_trip() {
        let (mut sys, mut ctx, mut mem) = setup();
        let path = temp_path("rw");

        // Guest memory: path at 0x100, payload at 0x200
        write_buffer(&mut mem, 0x100, path.as_bytes());
        mem.write_byte(0x100 + path.len() as u32, 0);
        write_buffer(&mut mem, 0x200, b"payload!");

        // open(path, O_WRONLY|O_CREAT|O_TRUNC, 0644)
        ctx.gpr.write(4, 0x100);
        ctx.gpr.write(5, 0o1 | 0o1000 | 0o2000);
        ctx.gpr.write(6, 0o644);
        sys.handle_syscall(numbers::NR_OPEN, &mut ctx, &mut mem);
        let fd = ctx.gpr.read(abi::V0);
        assert_eq!(ctx.gpr.read(abi::A3), 0, "open failed");

        // write(fd, 0x200, 8)
        ctx.gpr.write(4, fd);
        ctx.gpr.write(5, 0x200);
        ctx.gpr.write(6, 8);
        sys.handle_syscall(numbers::NR_WRITE, &mut ctx, &mut mem);
        assert_eq!(ctx.gpr.read(abi::V0), 8);

        // close(fd)
        ctx.gpr.write(4, fd);
        sys.handle_syscall(numbers::NR_CLOSE, &mut ctx, &mut mem);
        assert_eq!(std::fs::read(&path).unwrap(), b"payload!");

        // Re-open read-only and read back through the dispatcher
        ctx.gpr.write(4, 0x100);
        ctx.gpr.write(5, 0);
        ctx.gpr.write(6, 0);
        sys.handle_syscall(numbers::NR_OPEN, &mut ctx, &mut mem);
        let fd = ctx.gpr.read(abi::V0);

        ctx.gpr.write(4, fd);
        ctx.gpr.write(5, 0x300);
        ctx.gpr.write(6, 64);
        sys.handle_syscall(numbers::NR_READ, &mut ctx, &mut mem);
        assert_eq!(ctx.gpr.read(abi::V0), 8);
        assert_eq!(read_buffer(&mem, 0x300, 8), b"payload!");

        ctx.gpr.write(4, fd);
        sys.handle_syscall(numbers::NR_CLOSE, &mut ctx, &mut mem);

        // unlink(path)
        ctx.gpr.write(4, 0x100);
        sys.handle_syscall(numbers::NR_UNLINK, &mut ctx, &mut mem);
        assert_eq!(ctx.gpr.read(abi::A3), 0);
        assert!(!std::path::Path::new(&path).exists());
    }

    #[test]
    fn test_open_missing_file_sets_error_flag() {
        let (mut sys, mut ctx, mut mem) = setup();
        let path = b"/nonexistent/mips_emu_missing\0";
        write_buffer(&mut mem, 0x100, path);
        ctx.gpr.write(4, 0x100);
        ctx.gpr.write(5, 0);
        sys.handle_syscall(numbers::NR_OPEN, &mut ctx, &mut mem);
        assert_eq!(ctx.gpr.read(abi::V0), 0xFFFF_FFFF);
        assert_eq!(ctx.gpr.read(abi::A3), 1);
    }
}
