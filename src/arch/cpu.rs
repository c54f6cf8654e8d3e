//! Interrupt flag control.
//!
//! On bare metal these go through the `x86` crate. Hosted
//! builds keep a software copy of the flag so that masking discipline can be
//! observed from tests.

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod imp {
    use x86::bits32::eflags::{self, EFlags};

    pub fn are_enabled() -> bool {
        unsafe { eflags::read() }.contains(EFlags::FLAGS_IF)
    }

    pub fn disable() {
        unsafe { x86::irq::disable() }
    }

    pub fn enable() {
        unsafe { x86::irq::enable() }
    }

    /// `sti` only takes effect after the next instruction, so the pair has
    /// to be one sequence or a wakeup can land between them.
    pub fn enable_and_hlt() {
        unsafe { core::arch::asm!("sti", "hlt", options(nomem, nostack)) }
    }

    pub fn hlt() {
        unsafe { x86::halt() }
    }
}

#[cfg(all(not(all(target_arch = "x86", target_os = "none")), test))]
mod imp {
    use core::cell::Cell;

    // Each test thread gets its own simulated CPU.
    std::thread_local! {
        static ENABLED: Cell<bool> = const { Cell::new(true) };
    }

    pub fn are_enabled() -> bool {
        ENABLED.with(|f| f.get())
    }

    pub fn disable() {
        ENABLED.with(|f| f.set(false));
    }

    pub fn enable() {
        ENABLED.with(|f| f.set(true));
    }

    pub fn enable_and_hlt() {
        enable();
    }

    pub fn hlt() {}
}

#[cfg(all(not(all(target_arch = "x86", target_os = "none")), not(test)))]
mod imp {
    use core::sync::atomic::{AtomicBool, Ordering};

    static ENABLED: AtomicBool = AtomicBool::new(true);

    pub fn are_enabled() -> bool {
        ENABLED.load(Ordering::SeqCst)
    }

    pub fn disable() {
        ENABLED.store(false, Ordering::SeqCst);
    }

    pub fn enable() {
        ENABLED.store(true, Ordering::SeqCst);
    }

    pub fn enable_and_hlt() {
        enable();
        core::hint::spin_loop();
    }

    pub fn hlt() {
        core::hint::spin_loop();
    }
}

pub use imp::{are_enabled, disable, enable, enable_and_hlt, hlt};

/// Run `f` with interrupts masked, restoring the previous state afterwards.
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = crate::sync::IrqGuard::acquire();
    f()
}
