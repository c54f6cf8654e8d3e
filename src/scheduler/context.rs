/// Callee-saved register state of a suspended kernel execution point.
/// Layout is shared with the assembly below; do not reorder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Context {
    pub esp: u32,
    pub ebp: u32,
    pub ebx: u32,
    pub esi: u32,
    pub edi: u32,
    pub eip: u32,
}

impl Context {
    pub const fn empty() -> Self {
        Context { esp: 0, ebp: 0, ebx: 0, esi: 0, edi: 0, eip: 0 }
    }
}

/// Where a process starts executing in user mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserContext {
    pub eip: u32,
    pub esp: u32,
}

impl UserContext {
    pub const fn empty() -> Self {
        UserContext { eip: 0, esp: 0 }
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use self::switch::*;

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod switch {
    use super::Context;
    use core::arch::naked_asm;

    /// Save the running kernel context into `old` and resume `new`.
    ///
    /// # Safety
    /// Both pointers must be valid and `new` must hold a context saved by one
    /// of the functions in this module.
    #[unsafe(naked)]
    pub unsafe extern "C" fn switch_context(old: *mut Context, new: *const Context) {
        naked_asm!(
            "mov eax, [esp + 4]",
            "mov edx, [esp + 8]",
            "mov [eax + 0x00], esp",
            "mov [eax + 0x04], ebp",
            "mov [eax + 0x08], ebx",
            "mov [eax + 0x0C], esi",
            "mov [eax + 0x10], edi",
            "lea ecx, [2f]",
            "mov [eax + 0x14], ecx",
            "mov esp, [edx + 0x00]",
            "mov ebp, [edx + 0x04]",
            "mov ebx, [edx + 0x08]",
            "mov esi, [edx + 0x0C]",
            "mov edi, [edx + 0x10]",
            "jmp [edx + 0x14]",
            "2:",
            "ret",
        );
    }

    /// Save the running kernel context into `save`, then drop to ring 3 at
    /// `entry` with `stack`. Returns when `save` is resumed through
    /// [`resume_context`], yielding the status passed there.
    ///
    /// # Safety
    /// The user region must be mapped and `entry` must point into it.
    #[unsafe(naked)]
    pub unsafe extern "C" fn launch_user(save: *mut Context, entry: u32, stack: u32) -> i32 {
        naked_asm!(
            "mov eax, [esp + 4]",
            "mov [eax + 0x00], esp",
            "mov [eax + 0x04], ebp",
            "mov [eax + 0x08], ebx",
            "mov [eax + 0x0C], esi",
            "mov [eax + 0x10], edi",
            "lea ecx, [2f]",
            "mov [eax + 0x14], ecx",
            "mov ecx, [esp + 8]",
            "mov edx, [esp + 12]",
            "mov ax, 0x2B",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "push 0x2B",
            "push edx",
            "pushfd",
            "or dword ptr [esp], 0x200",
            "push 0x23",
            "push ecx",
            "iretd",
            "2:",
            "ret",
        );
    }

    /// Drop to ring 3 without saving anything.
    ///
    /// # Safety
    /// Same as [`launch_user`]; the caller's frame is abandoned.
    #[unsafe(naked)]
    pub unsafe extern "C" fn enter_user(entry: u32, stack: u32) -> ! {
        naked_asm!(
            "mov ecx, [esp + 4]",
            "mov edx, [esp + 8]",
            "mov ax, 0x2B",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "push 0x2B",
            "push edx",
            "pushfd",
            "or dword ptr [esp], 0x200",
            "push 0x23",
            "push ecx",
            "iretd",
        );
    }

    /// Resume `ctx`, making its pending [`launch_user`] return `status`.
    ///
    /// # Safety
    /// `ctx` must hold a context saved by [`launch_user`].
    #[unsafe(naked)]
    pub unsafe extern "C" fn resume_context(ctx: *const Context, status: i32) -> ! {
        naked_asm!(
            "mov edx, [esp + 4]",
            "mov eax, [esp + 8]",
            "mov esp, [edx + 0x00]",
            "mov ebp, [edx + 0x04]",
            "mov ebx, [edx + 0x08]",
            "mov esi, [edx + 0x0C]",
            "mov edi, [edx + 0x10]",
            "jmp [edx + 0x14]",
        );
    }
}
