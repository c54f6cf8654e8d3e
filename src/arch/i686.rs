//! The bare-metal [`Platform`]: control registers, the PIC, the TSS and the
//! identity-mapped VGA text buffer.

use x86::controlregs::{cr0, cr0_write, cr3_write, cr4, cr4_write, Cr0, Cr4};
use x86::io::outb;

use super::Platform;
use crate::config::{REGION_SIZE, USER_REGION, VIDEO_MEMORY};
use crate::drivers::tty::DisplayContext;
use crate::drivers::vga::{cursor_position, Screen};
use crate::error::{KernelError, KernelResult};
use crate::interrupts::{gdt, idt};

const CRTC_INDEX: u16 = 0x3D4;
const CRTC_DATA: u16 = 0x3D5;
const CURSOR_LOW: u8 = 0x0F;
const CURSOR_HIGH: u8 = 0x0E;

pub struct X86Platform;

impl X86Platform {
    pub const fn new() -> Self {
        X86Platform
    }

    fn move_cursor(display: &DisplayContext) {
        let pos = cursor_position(display);
        unsafe {
            outb(CRTC_INDEX, CURSOR_LOW);
            outb(CRTC_DATA, (pos & 0xFF) as u8);
            outb(CRTC_INDEX, CURSOR_HIGH);
            outb(CRTC_DATA, (pos >> 8) as u8);
        }
    }
}

impl Default for X86Platform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for X86Platform {
    fn flush_tlb(&mut self) {
        unsafe { x86::tlb::flush_all() }
    }

    fn activate_directory(&mut self, directory: u32) {
        unsafe {
            cr3_write(directory.into());
            cr4_write(cr4() | Cr4::CR4_ENABLE_PSE | Cr4::CR4_ENABLE_GLOBAL_PAGES);
            cr0_write(cr0() | Cr0::CR0_PROTECTED_MODE | Cr0::CR0_ENABLE_PAGING);
        }
    }

    fn set_kernel_stack(&mut self, top: u32) {
        gdt::set_tss_esp0(top);
    }

    fn end_of_interrupt(&mut self, irq: u8) {
        idt::end_of_interrupt(irq);
    }

    fn copy_screen(&mut self, from: u32, to: u32) {
        if from == to {
            return;
        }
        let (src, dst) = unsafe { (Screen::at(from), Screen::at(to)) };
        dst.copy_from(src);
    }

    fn render(&mut self, screen: u32, display: &mut DisplayContext, bytes: &[u8]) {
        unsafe { Screen::at(screen) }.draw(display, bytes);
        if screen == VIDEO_MEMORY {
            Self::move_cursor(display);
        }
    }

    fn write_user(&mut self, virt: u32, bytes: &[u8]) -> KernelResult<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| KernelError::BadAddress)?;
        let end = virt.checked_add(len).ok_or(KernelError::BadAddress)?;
        if virt < USER_REGION || end > USER_REGION + REGION_SIZE {
            return Err(KernelError::BadAddress);
        }
        unsafe {
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), virt as usize as *mut u8, bytes.len());
        }
        Ok(())
    }
}
