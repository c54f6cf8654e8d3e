//! Multiboot2 entry: header, boot stack and the hand-off to `kernel_main`.

use core::arch::global_asm;

use crate::fs::bootfs::BootFs;

global_asm!(
    ".section .multiboot2, \"a\"",
    ".align 8",
    "mb2_header_start:",
    ".long 0xE85250D6",
    ".long 0",
    ".long mb2_header_end - mb2_header_start",
    ".long 0x100000000 - (0xE85250D6 + (mb2_header_end - mb2_header_start))",
    // end tag
    ".short 0",
    ".short 0",
    ".long 8",
    "mb2_header_end:",
    "",
    ".section .bss",
    ".align 16",
    "boot_stack_bottom:",
    ".skip 0x40000",
    "boot_stack_top:",
    "",
    ".section .text",
    ".global _start",
    "_start:",
    "mov esp, offset boot_stack_top",
    "push ebx",
    "push eax",
    "call kernel_main",
    "2:",
    "cli",
    "hlt",
    "jmp 2b",
);

/// Find the boot filesystem: the first multiboot module.
pub fn boot_filesystem(magic: u32, info: u32) -> BootFs {
    if magic != multiboot2::MAGIC {
        panic!("not booted by a multiboot2 loader (magic {:#x})", magic);
    }
    let boot_info = match unsafe { multiboot2::BootInformation::load(info as usize as *const _) } {
        Ok(boot_info) => boot_info,
        Err(e) => panic!("Failed to load Multiboot2 info: {:?}", e),
    };
    let Some(module) = boot_info.module_tags().next() else {
        panic!("no boot filesystem module");
    };
    let start = module.start_address();
    let len = module.end_address().saturating_sub(start) as usize;
    crate::log_info!("boot: filesystem module at {:#x}, {} bytes", start, len);
    // Modules sit in identity-mapped memory and are never freed.
    let image: &'static [u8] = unsafe { core::slice::from_raw_parts(start as usize as *const u8, len) };
    match BootFs::new(image) {
        Ok(fs) => fs,
        Err(e) => panic!("bad boot filesystem: {}", e),
    }
}
