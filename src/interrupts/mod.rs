//! Interrupt glue.
//!
//! Handlers lock the global kernel, let it decide, then carry out the
//! returned [`Transfer`] after the lock has been dropped: a context switch
//! never happens while the kernel is borrowed.

pub mod gdt;
pub mod idt;
pub mod pic;
pub mod usermode;

use lazy_static::lazy_static;
use spin::Mutex;

use crate::arch::cpu;
use crate::arch::i686::X86Platform;
use crate::arch::Platform;
use crate::config::{KEYBOARD_IRQ, TIMER_IRQ};
use crate::error::KernelResult;
use crate::fs::bootfs::BootFs;
use crate::kernel::Kernel;
use crate::process::{Fault, FaultOutcome};
use crate::scheduler::{enter_user, launch_user, resume_context, switch_context, Transfer};
use crate::syscalls::{decode, SyscallOutcome};

pub type SystemKernel = Kernel<X86Platform, BootFs>;

lazy_static! {
    static ref KERNEL: Mutex<Option<SystemKernel>> = Mutex::new(None);
}

pub fn init() {
    gdt::init();
    idt::init();
    idt::init_pics();
}

/// Move the kernel into its static home and boot it there.
pub fn install(storage: BootFs) -> KernelResult<()> {
    cpu::without_interrupts(|| {
        let mut slot = KERNEL.lock();
        let kernel = slot.insert(Kernel::new(X86Platform::new(), storage));
        kernel.boot()
    })
}

/// Run `f` on the installed kernel with interrupts masked.
pub fn with_kernel<R>(f: impl FnOnce(&mut SystemKernel) -> R) -> Option<R> {
    cpu::without_interrupts(|| KERNEL.lock().as_mut().map(f))
}

/// Carry out a scheduler decision. Returns only for transfers that resume
/// the caller later: a switch away and back, or a launched child's exit.
unsafe fn perform(transfer: Transfer) -> i32 {
    let context = |pid| with_kernel(|k| k.kernel_context_ptr(pid)).and_then(Result::ok);
    match transfer {
        Transfer::Switch { from, to } => {
            let (Some(old), Some(new)) = (context(from), context(to)) else {
                crate::log_error!("switch: lost pid {} or {}", from.0, to.0);
                return -1;
            };
            unsafe { switch_context(old, new) };
            0
        }
        Transfer::Launch { from, entry, stack, .. } => {
            let Some(save) = context(from) else {
                crate::log_error!("launch: lost pid {}", from.0);
                return -1;
            };
            unsafe { launch_user(save, entry, stack) }
        }
        Transfer::Resume { to, status } => match context(to) {
            Some(ctx) => unsafe { resume_context(ctx, status) },
            None => panic!("halt: parent pid {} vanished", to.0),
        },
        Transfer::Restart { entry, stack, .. } => unsafe { enter_user(entry, stack) },
    }
}

pub(crate) fn timer_tick() {
    match with_kernel(|k| k.on_timer_tick()) {
        Some(Ok(Some(transfer))) => {
            unsafe { perform(transfer) };
        }
        Some(Ok(None)) => {}
        Some(Err(e)) => crate::log_warn!("timer: {}", e),
        None => X86Platform::new().end_of_interrupt(TIMER_IRQ),
    }
}

pub(crate) fn key_event(scancode: u8) {
    let result = with_kernel(|k| {
        let key = crate::drivers::keyboard::decode(scancode);
        let result = key.map_or(Ok(()), |key| k.key_input(key));
        k.platform_mut().end_of_interrupt(KEYBOARD_IRQ);
        result
    });
    if let Some(Err(e)) = result {
        crate::log_warn!("keyboard: {}", e);
    }
}

pub(crate) fn exception(vector: u8, frame: &idt::InterruptStackFrame, error_code: Option<u32>) {
    let address = if vector == 14 { read_cr2() } else { 0 };
    let fault = Fault::from_vector(vector, address);
    crate::log_error!("EXCEPTION: {} at {:#010x} (code {:?})", fault, frame.eip, error_code);
    // A fault raised while the kernel is locked is the kernel's own.
    let outcome = cpu::without_interrupts(|| {
        KERNEL.try_lock().and_then(|mut slot| slot.as_mut().map(|k| k.fault(fault)))
    });
    match outcome {
        Some(FaultOutcome::Exit(transfer)) => {
            unsafe { perform(transfer) };
        }
        _ => panic!("EXCEPTION: {}\n{:#?}", fault, frame),
    }
}

fn read_cr2() -> u32 {
    unsafe { x86::controlregs::cr2() as u32 }
}

/// Called from the `int 0x80` stub with the user's registers.
pub(crate) extern "C" fn syscall_entry(number: u32, arg0: u32, arg1: u32, arg2: u32) -> i32 {
    loop {
        let outcome = with_kernel(|k| {
            // The caller's user region is mapped while it is in a syscall.
            unsafe { decode(number, arg0, arg1, arg2) }.map(|call| call.dispatch(k))
        });
        match outcome.flatten() {
            None => {
                crate::log_warn!("syscall: bad call {} ({:#x}, {:#x}, {:#x})", number, arg0, arg1, arg2);
                return -1;
            }
            Some(SyscallOutcome::Return(value)) => return value,
            Some(SyscallOutcome::Transfer(transfer)) => return unsafe { perform(transfer) },
            Some(SyscallOutcome::Block) => cpu::enable_and_hlt(),
        }
    }
}
