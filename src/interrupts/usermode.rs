/// Usermode support: the `int 0x80` entry stub.
use core::arch::naked_asm;

use super::gdt::KERNEL_DATA_SELECTOR;

/// The int 0x80 handler, entered from Ring 3.
/// Saves user registers, calls the Rust dispatcher, restores and `iretd`s back.
///
/// Convention: EAX=syscall number, EBX=arg0, ECX=arg1, EDX=arg2.
/// Returns: EAX=result.
#[unsafe(naked)]
pub extern "C" fn syscall_handler_asm() {
    naked_asm!(
        "push ds",
        "push es",
        "push fs",
        "push gs",
        "push ebp",
        "push edi",
        "push esi",
        "push edx",
        "push ecx",
        "push ebx",

        // cdecl: syscall_entry(number, arg0, arg1, arg2)
        "push edx",
        "push ecx",
        "push ebx",
        "push eax",

        "mov ax, {data}",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",

        "call {entry}",
        "add esp, 16",

        // EAX carries the result back to the user.
        "pop ebx",
        "pop ecx",
        "pop edx",
        "pop esi",
        "pop edi",
        "pop ebp",
        "pop gs",
        "pop fs",
        "pop es",
        "pop ds",
        "iretd",
        data = const KERNEL_DATA_SELECTOR,
        entry = sym super::syscall_entry,
    );
}
