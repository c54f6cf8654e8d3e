use crate::arch::Platform;
use crate::config::{
    LINE_BUFFER_SIZE, REGION_SIZE, USER_LOAD_ADDR, USER_REGION, USER_VIDEO_ADDR,
};
use crate::error::{KernelError, KernelResult};
use crate::fs::fd::STDOUT;
use crate::fs::{FileOps, FileType, IoContext, OpenFile, Storage, FILE_NAME_LEN};
use crate::kernel::Kernel;
use crate::memory::paging::USER_VIDEO_FLAGS;
use crate::scheduler::{ProcessState, SchedClass, Transfer};
use crate::sync::IrqGuard;

/// Syscall numbers (passed in EAX from userland through `int 0x80`).
pub const SYS_HALT: u32 = 1;
pub const SYS_EXECUTE: u32 = 2;
pub const SYS_READ: u32 = 3;
pub const SYS_WRITE: u32 = 4;
pub const SYS_OPEN: u32 = 5;
pub const SYS_CLOSE: u32 = 6;
pub const SYS_GETARGS: u32 = 7;
pub const SYS_VIDMAP: u32 = 8;

/// A decoded system call with its user buffers already resolved.
#[derive(Debug, PartialEq, Eq)]
pub enum Syscall<'a> {
    Halt(u8),
    Execute(&'a [u8]),
    Read(usize, &'a mut [u8]),
    Write(usize, &'a [u8]),
    Open(&'a [u8]),
    Close(usize),
    GetArgs(&'a mut [u8]),
    MapDisplay(u32),
}

/// What the trap handler must do once a call has been serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallOutcome {
    /// Return this value in EAX.
    Return(i32),
    /// Leave through a scheduler transfer instead of returning.
    Transfer(Transfer),
    /// Nothing to return yet; wait for an interrupt and issue the call again.
    Block,
}

impl<'a> Syscall<'a> {
    /// Central syscall dispatcher. Every failure collapses into `-1`.
    pub fn dispatch<P: Platform, S: Storage>(self, kernel: &mut Kernel<P, S>) -> SyscallOutcome {
        let result = match self {
            Syscall::Halt(status) => return transfer_or_fail(kernel.halt(status)),
            Syscall::Execute(line) => return transfer_or_fail(kernel.execute(line)),
            Syscall::Read(fd, buf) => kernel.read(fd, buf).map(|n| n as i32),
            Syscall::Write(fd, buf) => kernel.write(fd, buf).map(|n| n as i32),
            Syscall::Open(name) => kernel.open(name).map(|fd| fd as i32),
            Syscall::Close(fd) => kernel.close(fd).map(|()| 0),
            Syscall::GetArgs(buf) => kernel.get_args(buf).map(|()| 0),
            Syscall::MapDisplay(out) => kernel.map_display(out).map(|_| 0),
        };
        match result {
            Ok(value) => SyscallOutcome::Return(value),
            Err(KernelError::WouldBlock) => SyscallOutcome::Block,
            Err(e) => SyscallOutcome::Return(e.as_status()),
        }
    }
}

fn transfer_or_fail(result: KernelResult<Transfer>) -> SyscallOutcome {
    match result {
        Ok(transfer) => SyscallOutcome::Transfer(transfer),
        Err(e) => {
            crate::log_warn!("syscall: {}", e);
            SyscallOutcome::Return(e.as_status())
        }
    }
}

fn in_user_region(ptr: u32, len: u32) -> bool {
    ptr >= USER_REGION && ptr.checked_add(len).map_or(false, |end| end <= USER_REGION + REGION_SIZE)
}

unsafe fn user_bytes<'a>(ptr: u32, len: u32) -> Option<&'a [u8]> {
    in_user_region(ptr, len)
        .then(|| unsafe { core::slice::from_raw_parts(ptr as usize as *const u8, len as usize) })
}

unsafe fn user_bytes_mut<'a>(ptr: u32, len: u32) -> Option<&'a mut [u8]> {
    in_user_region(ptr, len)
        .then(|| unsafe { core::slice::from_raw_parts_mut(ptr as usize as *mut u8, len as usize) })
}

/// A NUL-terminated user string, cut at `cap` bytes.
unsafe fn user_str<'a>(ptr: u32, cap: usize) -> Option<&'a [u8]> {
    if !in_user_region(ptr, 1) {
        return None;
    }
    let limit = ((USER_REGION + REGION_SIZE - ptr) as usize).min(cap);
    let bytes = unsafe { core::slice::from_raw_parts(ptr as usize as *const u8, limit) };
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(limit);
    Some(&bytes[..len])
}

/// Turn raw trap registers into a [`Syscall`].
///
/// Returns `None` for unknown numbers, negative descriptors or lengths, and
/// buffers reaching outside the user region.
///
/// # Safety
/// The user region must be mapped for the calling process, and the returned
/// slices must not outlive that mapping.
pub unsafe fn decode<'a>(number: u32, arg0: u32, arg1: u32, arg2: u32) -> Option<Syscall<'a>> {
    let fd = || usize::try_from(arg0 as i32).ok();
    let len = |raw: u32| (raw as i32 >= 0).then_some(raw);
    unsafe {
        match number {
            SYS_HALT => Some(Syscall::Halt(arg0 as u8)),
            SYS_EXECUTE => user_str(arg0, LINE_BUFFER_SIZE).map(Syscall::Execute),
            SYS_READ => Some(Syscall::Read(fd()?, user_bytes_mut(arg1, len(arg2)?)?)),
            SYS_WRITE => Some(Syscall::Write(fd()?, user_bytes(arg1, len(arg2)?)?)),
            SYS_OPEN => user_str(arg0, FILE_NAME_LEN).map(Syscall::Open),
            SYS_CLOSE => Some(Syscall::Close(fd()?)),
            SYS_GETARGS => user_bytes_mut(arg0, len(arg1)?).map(Syscall::GetArgs),
            SYS_VIDMAP => Some(Syscall::MapDisplay(arg0)),
            _ => None,
        }
    }
}

impl<P: Platform, S: Storage> Kernel<P, S> {
    /// Run `f` on descriptor `fd` of the current process.
    fn with_descriptor<R>(
        &mut self,
        fd: usize,
        f: impl FnOnce(&mut OpenFile, &mut IoContext<'_>) -> KernelResult<R>,
    ) -> KernelResult<R> {
        let (files, session) = {
            let pcb = self.sched.current_pcb()?;
            (pcb.files.ok_or(KernelError::BadDescriptor)?, pcb.terminal)
        };
        let file = self.files.get_mut(files)?.get_mut(fd)?;
        let mut io = IoContext {
            storage: &mut self.storage,
            terminals: &mut self.terminals,
            platform: &mut self.platform,
            session,
        };
        f(file, &mut io)
    }

    /// Read from `fd`. A terminal read with no complete line fails with
    /// [`KernelError::WouldBlock`] and leaves the process interruptible.
    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> KernelResult<usize> {
        let _irq = IrqGuard::acquire();
        let result = self.with_descriptor(fd, |file, io| file.read(io, buf));
        let state = if result == Err(KernelError::WouldBlock) {
            ProcessState::Interruptible
        } else {
            ProcessState::Running
        };
        self.sched.current_pcb_mut()?.state = state;
        result
    }

    pub fn write(&mut self, fd: usize, buf: &[u8]) -> KernelResult<usize> {
        let _irq = IrqGuard::acquire();
        self.with_descriptor(fd, |file, io| file.write(io, buf))
    }

    /// Open `name` on the lowest free descriptor.
    pub fn open(&mut self, name: &[u8]) -> KernelResult<usize> {
        let _irq = IrqGuard::acquire();
        if name.is_empty() {
            return Err(KernelError::InvalidArgument);
        }
        let (files, session) = {
            let pcb = self.sched.current_pcb()?;
            (pcb.files.ok_or(KernelError::BadDescriptor)?, pcb.terminal)
        };
        if self.files.get(files)?.is_full() {
            return Err(KernelError::DescriptorTableFull);
        }
        let entry = self.storage.lookup(name)?;
        let file = OpenFile::open(
            &entry,
            &mut IoContext {
                storage: &mut self.storage,
                terminals: &mut self.terminals,
                platform: &mut self.platform,
                session,
            },
        )?;
        let fd = self.files.get_mut(files)?.insert(file)?;
        self.sched.current_pcb_mut()?.class = match entry.file_type {
            FileType::Device => SchedClass::RealTime,
            _ => SchedClass::Regular,
        };
        Ok(fd)
    }

    pub fn close(&mut self, fd: usize) -> KernelResult<()> {
        let _irq = IrqGuard::acquire();
        if fd <= STDOUT {
            return Err(KernelError::BadDescriptor);
        }
        let (files, session) = {
            let pcb = self.sched.current_pcb()?;
            (pcb.files.ok_or(KernelError::BadDescriptor)?, pcb.terminal)
        };
        let mut file = self.files.get_mut(files)?.remove(fd)?;
        file.close(&mut IoContext {
            storage: &mut self.storage,
            terminals: &mut self.terminals,
            platform: &mut self.platform,
            session,
        })
    }

    /// Copy the current process's argument tail into `buf`, NUL-terminated.
    pub fn get_args(&mut self, buf: &mut [u8]) -> KernelResult<()> {
        let pcb = self.sched.current_pcb()?;
        let args = pcb.args.as_slice();
        if args.is_empty() {
            return Err(KernelError::NoArguments);
        }
        if buf.len() <= args.len() {
            return Err(KernelError::BufferTooSmall);
        }
        buf[..args.len()].copy_from_slice(args);
        buf[args.len()] = 0;
        Ok(())
    }

    /// Give the current process a window onto its session's screen at
    /// `USER_VIDEO_ADDR`, storing that address at user pointer `out`.
    ///
    /// The window shows the physical screen while the session is in front
    /// and its shadow copy otherwise. Nothing is mapped when `out` is bad.
    pub fn map_display(&mut self, out: u32) -> KernelResult<u32> {
        let _irq = IrqGuard::acquire();
        let end = out.checked_add(4).ok_or(KernelError::BadAddress)?;
        if out < USER_LOAD_ADDR || end > USER_REGION + REGION_SIZE {
            return Err(KernelError::BadAddress);
        }
        let terminal = self.sched.current_pcb()?.terminal;
        self.platform.write_user(out, &USER_VIDEO_ADDR.to_le_bytes())?;
        let screen = self.terminals.screen_for(terminal);
        self.space
            .map_table_page(&mut self.platform, screen, USER_VIDEO_ADDR, USER_VIDEO_FLAGS)?;
        self.sched.current_pcb_mut()?.display_mapped = true;
        Ok(USER_VIDEO_ADDR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MAX_OPEN_FILES, VIDEO_MEMORY};
    use crate::drivers::tty::KeyInput;
    use crate::scheduler::Pid;
    use crate::testing::booted_with_sessions;

    #[test]
    fn terminal_read_blocks_until_enter() {
        let mut kernel = booted_with_sessions(1);
        let mut buf = [0u8; 16];
        assert_eq!(kernel.read(0, &mut buf), Err(KernelError::WouldBlock));
        assert_eq!(kernel.pcb(Pid(1)).unwrap().state, ProcessState::Interruptible);

        for key in [KeyInput::Char(b'l'), KeyInput::Char(b's'), KeyInput::Enter] {
            kernel.key_input(key).unwrap();
        }
        assert_eq!(kernel.read(0, &mut buf), Ok(3));
        assert_eq!(&buf[..3], b"ls\n");
        assert_eq!(kernel.pcb(Pid(1)).unwrap().state, ProcessState::Running);
    }

    #[test]
    fn stdout_draws_on_the_session_screen() {
        let mut kernel = booted_with_sessions(1);
        assert_eq!(kernel.write(1, b"hi"), Ok(2));
        assert_eq!(kernel.platform().output(VIDEO_MEMORY), b"hi");
        assert_eq!(kernel.write(0, b"hi"), Err(KernelError::Unsupported));
        assert_eq!(kernel.write(5, b"hi"), Err(KernelError::BadDescriptor));
    }

    #[test]
    fn open_read_close_a_file() {
        let mut kernel = booted_with_sessions(1);
        let fd = kernel.open(b"frame0.txt").unwrap();
        assert_eq!(fd, 2);
        let mut buf = [0u8; 10];
        assert_eq!(kernel.read(fd, &mut buf), Ok(4));
        assert_eq!(&buf[..4], b"fish");
        assert_eq!(kernel.read(fd, &mut buf), Ok(0));
        assert_eq!(kernel.close(fd), Ok(()));
        assert_eq!(kernel.close(fd), Err(KernelError::BadDescriptor));
        assert_eq!(kernel.read(fd, &mut buf), Err(KernelError::BadDescriptor));
    }

    #[test]
    fn open_validates_its_argument() {
        let mut kernel = booted_with_sessions(1);
        assert_eq!(kernel.open(b""), Err(KernelError::InvalidArgument));
        assert_eq!(kernel.open(b"nope"), Err(KernelError::NotFound));
        for expected in 2..MAX_OPEN_FILES {
            assert_eq!(kernel.open(b"."), Ok(expected));
        }
        assert_eq!(kernel.open(b"."), Err(KernelError::DescriptorTableFull));
    }

    #[test]
    fn stdio_cannot_be_closed() {
        let mut kernel = booted_with_sessions(1);
        assert_eq!(kernel.close(0), Err(KernelError::BadDescriptor));
        assert_eq!(kernel.close(1), Err(KernelError::BadDescriptor));
    }

    #[test]
    fn device_descriptors_reach_the_driver() {
        let mut kernel = booted_with_sessions(1);
        let fd = kernel.open(b"rtc").unwrap();
        assert_eq!(kernel.pcb(Pid(1)).unwrap().class, SchedClass::RealTime);
        assert_eq!(kernel.write(fd, &[4, 0, 0, 0]), Ok(4));
        kernel.close(fd).unwrap();
        let device = &kernel.storage_mut().device;
        assert_eq!((device.opens, device.closes), (1, 1));
        assert_eq!(device.written, vec![4, 0, 0, 0]);
    }

    #[test]
    fn arguments_are_nul_terminated() {
        let mut kernel = booted_with_sessions(1);
        let mut buf = [0xFFu8; 16];
        assert_eq!(kernel.get_args(&mut buf), Err(KernelError::NoArguments));

        kernel.execute(b"grep foo bar").unwrap();
        assert_eq!(kernel.get_args(&mut buf), Ok(()));
        assert_eq!(&buf[..8], b"foo bar\0");
        let mut exact = [0u8; 7];
        assert_eq!(kernel.get_args(&mut exact), Err(KernelError::BufferTooSmall));
    }

    #[test]
    fn map_display_writes_the_window_address() {
        let mut kernel = booted_with_sessions(1);
        let out = USER_LOAD_ADDR + 0x100;
        assert_eq!(kernel.map_display(out), Ok(USER_VIDEO_ADDR));
        assert_eq!(
            kernel.platform().user_write_at(out),
            Some(&USER_VIDEO_ADDR.to_le_bytes()[..])
        );
        assert_eq!(kernel.address_space().translate(USER_VIDEO_ADDR), Some(VIDEO_MEMORY));
        assert!(kernel.pcb(Pid(1)).unwrap().display_mapped);
    }

    #[test]
    fn map_display_rejects_bad_pointers_without_mapping() {
        let mut kernel = booted_with_sessions(1);
        let flushes = kernel.platform().flushes;
        let writes = kernel.platform().user_writes.len();
        for out in [0, USER_REGION, USER_LOAD_ADDR - 1, USER_REGION + REGION_SIZE - 3, u32::MAX - 1] {
            assert_eq!(kernel.map_display(out), Err(KernelError::BadAddress), "{:#x}", out);
        }
        assert_eq!(kernel.platform().flushes, flushes);
        assert_eq!(kernel.platform().user_writes.len(), writes);
        assert_eq!(kernel.address_space().translate(USER_VIDEO_ADDR), None);
        assert!(!kernel.pcb(Pid(1)).unwrap().display_mapped);
    }

    #[test]
    fn dispatch_maps_results_to_outcomes() {
        let mut kernel = booted_with_sessions(1);
        let mut buf = [0u8; 8];
        assert_eq!(Syscall::Read(0, &mut buf).dispatch(&mut *kernel), SyscallOutcome::Block);
        assert_eq!(Syscall::Write(1, b"ok").dispatch(&mut *kernel), SyscallOutcome::Return(2));
        assert_eq!(Syscall::Close(0).dispatch(&mut *kernel), SyscallOutcome::Return(-1));
        assert_eq!(Syscall::Execute(b"nope").dispatch(&mut *kernel), SyscallOutcome::Return(-1));

        let child = match Syscall::Execute(b"grep").dispatch(&mut *kernel) {
            SyscallOutcome::Transfer(Transfer::Launch { to, .. }) => to,
            other => panic!("unexpected {:?}", other),
        };
        assert_ne!(child, Pid(1));
        assert_eq!(
            Syscall::Halt(3).dispatch(&mut *kernel),
            SyscallOutcome::Transfer(Transfer::Resume { to: Pid(1), status: 3 })
        );
    }

    #[test]
    fn decode_rejects_what_it_cannot_trust() {
        unsafe {
            assert_eq!(decode(SYS_HALT, 0x12C, 0, 0), Some(Syscall::Halt(0x2C)));
            assert_eq!(decode(SYS_CLOSE, 5, 0, 0), Some(Syscall::Close(5)));
            assert_eq!(decode(SYS_VIDMAP, 0x10, 0, 0), Some(Syscall::MapDisplay(0x10)));
            assert_eq!(decode(SYS_READ, 0, USER_LOAD_ADDR, 0), Some(Syscall::Read(0, &mut [])));
            assert_eq!(decode(SYS_READ, 0, 0x1000, 4), None);
            assert_eq!(decode(SYS_READ, u32::MAX, USER_LOAD_ADDR, 4), None);
            assert_eq!(decode(SYS_WRITE, 1, USER_LOAD_ADDR, u32::MAX), None);
            assert_eq!(decode(SYS_WRITE, 1, USER_REGION + REGION_SIZE - 2, 4), None);
            assert_eq!(decode(SYS_OPEN, 0, 0, 0), None);
            assert_eq!(decode(SYS_CLOSE, u32::MAX, 0, 0), None);
            assert_eq!(decode(0, 0, 0, 0), None);
            assert_eq!(decode(9, 0, 0, 0), None);
        }
    }
}
