use core::ptr::{addr_of, addr_of_mut};

use lazy_static::lazy_static;
use x86::bits32::task::TaskStateSegment;
use x86::dtables::{lgdt, DescriptorTablePointer};
use x86::segmentation::{
    self, BuildDescriptor, CodeSegmentType, DataSegmentType, Descriptor, DescriptorBuilder,
    GateDescriptorBuilder, SegmentDescriptorBuilder, SegmentSelector,
};
use x86::task::load_tr;
use x86::Ring;

use crate::memory::kernel_stack_top;
use crate::scheduler::Pid;

pub const KERNEL_CODE_SELECTOR: u16 = 0x08;
pub const KERNEL_DATA_SELECTOR: u16 = 0x10;
pub const TSS_SELECTOR: u16 = 0x18;
/// Ring-3 selectors, RPL included.
pub const USER_CODE_SELECTOR: u16 = 0x23;
pub const USER_DATA_SELECTOR: u16 = 0x2B;

/// Only the ring-0 stack fields are used.
static mut TSS: TaskStateSegment = TaskStateSegment::new();

// Flat 4GB segments, limit in 4KB pages.
const FLAT_LIMIT: u32 = 0xF_FFFF;

fn code_segment(dpl: Ring) -> Descriptor {
    <DescriptorBuilder as SegmentDescriptorBuilder<u32>>::code_descriptor(
        0,
        FLAT_LIMIT,
        CodeSegmentType::ExecuteRead,
    )
    .present()
    .dpl(dpl)
    .limit_granularity_4kb()
    .db()
    .finish()
}

fn data_segment(dpl: Ring) -> Descriptor {
    <DescriptorBuilder as SegmentDescriptorBuilder<u32>>::data_descriptor(
        0,
        FLAT_LIMIT,
        DataSegmentType::ReadWrite,
    )
    .present()
    .dpl(dpl)
    .limit_granularity_4kb()
    .db()
    .finish()
}

fn tss_segment() -> Descriptor {
    let base = addr_of!(TSS) as usize as u32;
    let limit = core::mem::size_of::<TaskStateSegment>() as u32 - 1;
    <DescriptorBuilder as GateDescriptorBuilder<u32>>::tss_descriptor(
        base.into(),
        limit.into(),
        true,
    )
    .present()
    .dpl(Ring::Ring0)
    .finish()
}

lazy_static! {
    // Order fixes the selector values above.
    static ref GDT: [Descriptor; 6] = [
        Descriptor::NULL,
        code_segment(Ring::Ring0),
        data_segment(Ring::Ring0),
        tss_segment(),
        code_segment(Ring::Ring3),
        data_segment(Ring::Ring3),
    ];
}

pub fn init() {
    unsafe {
        let tss = &mut *addr_of_mut!(TSS);
        tss.ss0 = KERNEL_DATA_SELECTOR;
        // Past the limit: no I/O permission bitmap, so ring 3 gets no ports.
        tss.iobp_offset = core::mem::size_of::<TaskStateSegment>() as u16;
    }
    set_tss_esp0(kernel_stack_top(Pid::IDLE));

    let code = SegmentSelector::from_raw(KERNEL_CODE_SELECTOR);
    let data = SegmentSelector::from_raw(KERNEL_DATA_SELECTOR);
    unsafe {
        lgdt(&DescriptorTablePointer::new_from_slice(&GDT[..]));
        x86::bits32::segmentation::load_cs(code);
        segmentation::load_ds(data);
        segmentation::load_es(data);
        segmentation::load_fs(data);
        segmentation::load_gs(data);
        segmentation::load_ss(data);
        load_tr(SegmentSelector::from_raw(TSS_SELECTOR));
    }
    crate::log_info!("gdt: loaded, tss at {:#x}", addr_of!(TSS) as usize);
}

/// Update the ESP0 field in the TSS so that the CPU uses the current task's
/// kernel stack when transitioning from Ring 3 to Ring 0.
pub fn set_tss_esp0(top: u32) {
    // Only called with interrupts masked; the CPU reads the field on the
    // next privilege change.
    unsafe {
        (*addr_of_mut!(TSS)).esp0 = top;
    }
}
