//! Compile-time kernel configuration.
//!
//! Every fixed capacity and every address of the physical/virtual layout
//! lives here so that the rest of the kernel never hard-codes a number.

// ══════════════════════════════════════════════════════════════
//  Process limits
// ══════════════════════════════════════════════════════════════

/// Size of the PID space. PID 0 is the idle task and is never handed out to
/// user programs.
pub const MAX_PIDS: usize = 256;

/// Maximum number of user processes that may be runnable at the same time.
/// The PID space is larger, but each runnable process owns a 4MB physical
/// frame and an 8KB kernel stack slot, so this is the real ceiling.
pub const MAX_PROCESSES: usize = 8;

/// Number of virtual terminal sessions. Each one owns a run-queue, a shell
/// and an off-screen copy of the display.
pub const NUM_TERMINALS: usize = 3;

/// Number of file tables in the pool. Table 0 belongs to the idle task.
pub const MAX_FILE_TABLES: usize = 10;

/// Number of descriptors per file table. Descriptors 0 and 1 are stdin and
/// stdout and are opened on table creation.
pub const MAX_OPEN_FILES: usize = 8;

/// Length of a program name, in bytes.
pub const COMMAND_NAME_LEN: usize = 32;

/// Length of the argument tail. A command line comes from one terminal input
/// line, so it can never be longer than the line buffer.
pub const COMMAND_ARGS_LEN: usize = LINE_BUFFER_SIZE;

/// Size of a terminal input line, including the trailing newline.
pub const LINE_BUFFER_SIZE: usize = 128;

/// Program run when a terminal session is bootstrapped or its base shell
/// exits.
pub const SHELL_NAME: &[u8] = b"shell";

/// Exit status reported to a parent whose child was killed by a CPU fault.
/// Real exit codes are a single byte, so it cannot collide with them.
pub const DIE_BY_EXCEPTION: i32 = 256;

// ══════════════════════════════════════════════════════════════
//  Memory layout
// ══════════════════════════════════════════════════════════════

pub const PAGE_SIZE: u32 = 4096;
pub const REGION_SIZE: u32 = 4 * 1024 * 1024;

/// Physical start of the kernel image; also the frame the idle task uses.
pub const KERNEL_FRAME: u32 = REGION_SIZE;

/// Top of the kernel stack area. Each PID owns one slot below it.
pub const KERNEL_STACK_BASE: u32 = 2 * REGION_SIZE;
pub const KERNEL_STACK_SIZE: u32 = 0x2000;

/// Virtual base of the 4MB user region; every process sees its own frame here.
pub const USER_REGION: u32 = 0x0800_0000;
/// Where program images are copied to.
pub const USER_LOAD_ADDR: u32 = 0x0804_8000;
pub const USER_STACK_TOP: u32 = USER_REGION + REGION_SIZE - 4;
/// Virtual page a process gets when it asks for direct display access.
pub const USER_VIDEO_ADDR: u32 = 0x08C0_0000;

/// Physical VGA text buffer.
pub const VIDEO_MEMORY: u32 = 0xB8000;
/// End of the identity-mapped video window (exclusive).
pub const VIDEO_MEMORY_END: u32 = 0xC0000;
/// Offset of the first shadow screen from the VGA buffer.
pub const SHADOW_SCREEN_OFFSET: u32 = 2 * PAGE_SIZE;

pub const SCREEN_COLUMNS: u16 = 80;
pub const SCREEN_ROWS: u16 = 25;

// ══════════════════════════════════════════════════════════════
//  Preemption
// ══════════════════════════════════════════════════════════════

/// Ticks between two session bootstraps. Tick `n * BOOTSTRAP_SPACING`
/// attaches the shell of session `n`; the ticks in between only count.
pub const BOOTSTRAP_SPACING: u32 = 10;

/// First tick of the round-robin phase.
pub const ROTATION_START: u32 = BOOTSTRAP_SPACING * NUM_TERMINALS as u32;

// ══════════════════════════════════════════════════════════════
//  Interrupt lines
// ══════════════════════════════════════════════════════════════

pub const TIMER_IRQ: u8 = 0;
pub const KEYBOARD_IRQ: u8 = 1;
