use lazy_static::lazy_static;
use spin::Mutex;
use x86::dtables::{lidt, DescriptorTablePointer};
use x86::segmentation::{
    BuildDescriptor, Descriptor, DescriptorBuilder, GateDescriptorBuilder, SegmentSelector,
};
use x86::Ring;

use super::gdt::KERNEL_CODE_SELECTOR;
use super::pic::ChainedPics;
use crate::config::{KEYBOARD_IRQ, TIMER_IRQ};

pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;
pub const SYSCALL_VECTOR: usize = 0x80;

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum InterruptIndex {
    Timer = PIC_1_OFFSET + TIMER_IRQ,
    Keyboard = PIC_1_OFFSET + KEYBOARD_IRQ,
}

impl InterruptIndex {
    fn as_usize(self) -> usize {
        self as u8 as usize
    }
}

/// What the CPU pushes for a trap taken in the same or a lower ring.
#[derive(Debug)]
#[repr(C)]
pub struct InterruptStackFrame {
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
}

/// Present 32-bit interrupt gate into kernel code, reachable from ring `dpl`.
fn gate(handler: usize, dpl: Ring) -> Descriptor {
    <DescriptorBuilder as GateDescriptorBuilder<u32>>::interrupt_descriptor(
        SegmentSelector::from_raw(KERNEL_CODE_SELECTOR),
        handler as u32,
    )
    .present()
    .dpl(dpl)
    .finish()
}

type Handler = extern "x86-interrupt" fn(InterruptStackFrame);
type HandlerWithCode = extern "x86-interrupt" fn(InterruptStackFrame, u32);

lazy_static! {
    static ref IDT: [Descriptor; 256] = {
        let mut idt = [Descriptor::NULL; 256];
        let plain: [(usize, Handler); 6] = [
            (0, divide_error_handler),
            (1, debug_handler),
            (3, breakpoint_handler),
            (4, overflow_handler),
            (6, invalid_opcode_handler),
            (7, device_not_available_handler),
        ];
        for (vector, handler) in plain {
            idt[vector] = gate(handler as usize, Ring::Ring0);
        }
        let with_code: [(usize, HandlerWithCode); 6] = [
            (8, double_fault_handler),
            (10, invalid_tss_handler),
            (11, segment_not_present_handler),
            (12, stack_segment_handler),
            (13, general_protection_fault_handler),
            (14, page_fault_handler),
        ];
        for (vector, handler) in with_code {
            idt[vector] = gate(handler as usize, Ring::Ring0);
        }
        idt[InterruptIndex::Timer.as_usize()] = gate(timer_interrupt_handler as usize, Ring::Ring0);
        idt[InterruptIndex::Keyboard.as_usize()] =
            gate(keyboard_interrupt_handler as usize, Ring::Ring0);
        idt[SYSCALL_VECTOR] = gate(super::usermode::syscall_handler_asm as usize, Ring::Ring3);
        idt
    };
}

pub fn init() {
    unsafe { lidt(&DescriptorTablePointer::new_from_slice(&IDT[..])) };
}

/// Remap both 8259s above the exception vectors and unmask the timer and
/// keyboard lines only.
pub fn init_pics() {
    let mut pics = PICS.lock();
    unsafe {
        pics.initialize();
        pics.enable_only(&[TIMER_IRQ, KEYBOARD_IRQ]);
    }
}

/// Acknowledge IRQ line `irq`; the two offsets are contiguous.
pub fn end_of_interrupt(irq: u8) {
    unsafe { PICS.lock().notify_end_of_interrupt(PIC_1_OFFSET + irq) };
}

macro_rules! exception_handler {
    ($name:ident, $vector:expr) => {
        extern "x86-interrupt" fn $name(frame: InterruptStackFrame) {
            super::exception($vector, &frame, None);
        }
    };
    ($name:ident, $vector:expr, code) => {
        extern "x86-interrupt" fn $name(frame: InterruptStackFrame, error_code: u32) {
            super::exception($vector, &frame, Some(error_code));
        }
    };
}

exception_handler!(divide_error_handler, 0);
exception_handler!(debug_handler, 1);
exception_handler!(breakpoint_handler, 3);
exception_handler!(overflow_handler, 4);
exception_handler!(invalid_opcode_handler, 6);
exception_handler!(device_not_available_handler, 7);
exception_handler!(invalid_tss_handler, 10, code);
exception_handler!(segment_not_present_handler, 11, code);
exception_handler!(stack_segment_handler, 12, code);
exception_handler!(general_protection_fault_handler, 13, code);
exception_handler!(page_fault_handler, 14, code);

extern "x86-interrupt" fn double_fault_handler(frame: InterruptStackFrame, _error_code: u32) {
    panic!("EXCEPTION: DOUBLE FAULT\n{:#?}", frame);
}

extern "x86-interrupt" fn timer_interrupt_handler(_frame: InterruptStackFrame) {
    super::timer_tick();
}

extern "x86-interrupt" fn keyboard_interrupt_handler(_frame: InterruptStackFrame) {
    let scancode = crate::drivers::keyboard::read_scancode();
    super::key_event(scancode);
}
