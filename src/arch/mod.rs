//! Hardware boundary.
//!
//! The scheduler, the mapper and the process lifecycle never touch the CPU
//! directly: everything that needs a privileged instruction or raw physical
//! memory goes through [`Platform`]. The bare-metal implementation lives in
//! [`i686`]; unit tests plug in a recording mock.

pub mod cpu;
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod i686;

use crate::drivers::tty::DisplayContext;
use crate::error::KernelResult;

pub trait Platform {
    /// Invalidate every cached address translation.
    fn flush_tlb(&mut self);

    /// Load `directory` as the active page directory and turn paging on.
    fn activate_directory(&mut self, directory: u32);

    /// Point the task-state segment's ring-0 stack at `top`.
    fn set_kernel_stack(&mut self, top: u32);

    /// Acknowledge interrupt line `irq` at the interrupt controller.
    fn end_of_interrupt(&mut self, irq: u8);

    /// Copy one screen of text memory between two physical buffers.
    fn copy_screen(&mut self, from: u32, to: u32);

    /// Draw `bytes` as text onto the screen buffer at `screen`, advancing the
    /// cursor in `display`.
    fn render(&mut self, screen: u32, display: &mut DisplayContext, bytes: &[u8]);

    /// Copy `bytes` into the currently mapped user region at `virt`.
    fn write_user(&mut self, virt: u32, bytes: &[u8]) -> KernelResult<()>;
}
