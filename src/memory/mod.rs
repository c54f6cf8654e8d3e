pub mod paging;

pub use paging::{AddressSpace, Entry, PageFlags, PageTable};

use crate::config::{
    KERNEL_FRAME, KERNEL_STACK_BASE, KERNEL_STACK_SIZE, PAGE_SIZE, REGION_SIZE,
    SHADOW_SCREEN_OFFSET, VIDEO_MEMORY,
};
use crate::drivers::tty::TerminalId;
use crate::scheduler::task::Pid;

/// Physical 4MB frame backing the user region of `pid`.
///
/// The idle task shares the kernel frame; every other PID owns the frame
/// right after the previous one.
pub fn process_frame(pid: Pid) -> u32 {
    KERNEL_FRAME + u32::from(pid.0) * REGION_SIZE
}

/// Top of the ring-0 stack slot owned by `pid`.
pub fn kernel_stack_top(pid: Pid) -> u32 {
    KERNEL_STACK_BASE - u32::from(pid.0) * KERNEL_STACK_SIZE
}

/// Physical address of the off-screen copy of a session's display.
pub fn shadow_screen(session: TerminalId) -> u32 {
    VIDEO_MEMORY + SHADOW_SCREEN_OFFSET + session as u32 * PAGE_SIZE
}
