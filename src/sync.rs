//! Interrupt-masking critical sections and the line-completed flag that
//! blocking reads poll.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::cpu;

/// Masks interrupts while alive.
///
/// Dropping the guard restores the interrupt flag to what it was when the
/// guard was acquired, so nested guards only re-enable at the outermost
/// level and every early return releases the section.
#[must_use = "interrupts are unmasked as soon as the guard is dropped"]
pub struct IrqGuard {
    was_enabled: bool,
}

impl IrqGuard {
    pub fn acquire() -> Self {
        let was_enabled = cpu::are_enabled();
        if was_enabled {
            cpu::disable();
        }
        IrqGuard { was_enabled }
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.was_enabled {
            cpu::enable();
        }
    }
}

/// A one-shot condition set from interrupt context and consumed by a reader.
#[derive(Debug, Default)]
pub struct WaitFlag {
    ready: AtomicBool,
}

impl WaitFlag {
    pub const fn new() -> Self {
        WaitFlag { ready: AtomicBool::new(false) }
    }

    pub fn notify(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Consume the condition. Returns whether it was set.
    pub fn take(&self) -> bool {
        self.ready.swap(false, Ordering::AcqRel)
    }

    pub fn clear(&self) {
        self.ready.store(false, Ordering::Release);
    }
}
