//! Process lifecycle: spawning programs, attaching the base shells, exit and
//! the fault exit path.

pub mod command;

pub use command::Command;

use core::fmt;

use crate::arch::Platform;
use crate::config::{
    DIE_BY_EXCEPTION, MAX_PROCESSES, NUM_TERMINALS, SHELL_NAME, USER_REGION, USER_STACK_TOP,
    USER_VIDEO_ADDR,
};
use crate::drivers::tty::TerminalId;
use crate::error::{KernelError, KernelResult};
use crate::fs::{IoContext, Storage};
use crate::kernel::Kernel;
use crate::loader::{self, ProgramImage};
use crate::memory::paging::{USER_REGION_FLAGS, USER_VIDEO_FLAGS};
use crate::memory::{kernel_stack_top, process_frame};
use crate::scheduler::{Pid, ProcessState, SchedClass, Transfer, UserContext};
use crate::sync::IrqGuard;

/// A CPU exception raised while a process was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    DivideError,
    InvalidOpcode,
    GeneralProtection,
    PageFault { address: u32 },
    Other(u8),
}

impl Fault {
    /// Classify exception `vector`; `address` is the faulting address
    /// reported for page faults.
    pub fn from_vector(vector: u8, address: u32) -> Fault {
        match vector {
            0 => Fault::DivideError,
            6 => Fault::InvalidOpcode,
            13 => Fault::GeneralProtection,
            14 => Fault::PageFault { address },
            other => Fault::Other(other),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Fault::DivideError => write!(f, "divide error"),
            Fault::InvalidOpcode => write!(f, "invalid opcode"),
            Fault::GeneralProtection => write!(f, "general protection fault"),
            Fault::PageFault { address } => write!(f, "page fault at {:#010x}", address),
            Fault::Other(vector) => write!(f, "exception {}", vector),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// No process to blame: the system must stop.
    Fatal,
    /// The faulting process was forced out.
    Exit(Transfer),
}

struct SpawnRequest<'a> {
    name: &'a [u8],
    args: &'a [u8],
    parent: Pid,
    terminal: TerminalId,
    class: SchedClass,
    /// The process giving up the CPU holds the display window.
    release_window: bool,
}

fn printable(bytes: &[u8]) -> &str {
    core::str::from_utf8(bytes).unwrap_or("?")
}

impl<P: Platform, S: Storage> Kernel<P, S> {
    /// Run `line` as a child of the current process.
    ///
    /// Nothing is committed until the PID, the image and a file table are
    /// all known to be available. The child shares its parent's session and
    /// becomes the newest task of that session's queue.
    pub fn execute(&mut self, line: &[u8]) -> KernelResult<Transfer> {
        let _irq = IrqGuard::acquire();
        if self.sched.runnable() >= MAX_PROCESSES {
            return Err(KernelError::ProcessLimit);
        }
        let command = Command::parse(line)?;
        let parent = self.sched.current()?;
        let (terminal, parent_mapped) = {
            let pcb = self.sched.pids.get(parent)?;
            (pcb.terminal, pcb.display_mapped)
        };
        let class = if command.name() == SHELL_NAME {
            SchedClass::Interactive
        } else {
            SchedClass::Regular
        };
        let (pid, entry) = self.spawn(SpawnRequest {
            name: command.name(),
            args: command.args(),
            parent,
            terminal,
            class,
            release_window: parent_mapped,
        })?;
        crate::log_info!(
            "exec: pid {} '{}' on tty{} (parent {})",
            pid.0,
            printable(command.name()),
            terminal,
            parent.0
        );
        Ok(Transfer::Launch { from: parent, to: pid, entry, stack: USER_STACK_TOP })
    }

    /// Start the base shell of `session` and give it the CPU.
    pub fn attach_shell(&mut self, session: TerminalId) -> KernelResult<Transfer> {
        let _irq = IrqGuard::acquire();
        if session >= NUM_TERMINALS {
            return Err(KernelError::InvalidArgument);
        }
        if self.sched.runnable() >= MAX_PROCESSES {
            return Err(KernelError::ProcessLimit);
        }
        let previous = self.sched.current()?;
        let (previous_session, previous_mapped) = {
            let pcb = self.sched.pids.get(previous)?;
            (pcb.terminal, pcb.display_mapped)
        };
        let (pid, entry) = self.spawn(SpawnRequest {
            name: SHELL_NAME,
            args: b"",
            parent: Pid::IDLE,
            terminal: session,
            class: SchedClass::Interactive,
            release_window: previous_mapped,
        })?;

        self.terminals.enable(session);
        self.terminals.session_mut(session).bootstrapped = true;
        self.terminals.save_display(previous_session);
        self.terminals.restore_display(session);
        let screen = self.terminals.screen_for(session);
        self.terminals.set_display_base(screen);
        crate::log_info!("tty{}: base shell is pid {}", session, pid.0);
        Ok(Transfer::Launch { from: previous, to: pid, entry, stack: USER_STACK_TOP })
    }

    /// Terminate the current process with `status`.
    ///
    /// A base shell is never reaped: it is restarted in place, keeping its
    /// PID and its run-queue node. Any other process is torn down and its
    /// parent resumed with the status, or with `DIE_BY_EXCEPTION` when the
    /// exit was forced by a fault.
    pub fn halt(&mut self, status: u8) -> KernelResult<Transfer> {
        let _irq = IrqGuard::acquire();
        let pid = self.sched.current()?;
        if pid.is_idle() {
            return Err(KernelError::NoCurrentProcess);
        }
        let (parent, terminal) = {
            let pcb = self.sched.pids.get(pid)?;
            (pcb.parent, pcb.terminal)
        };
        self.terminals.session_mut(terminal).input.clear();
        match parent {
            Some(parent) if !parent.is_idle() => self.reap(pid, parent, status),
            _ => self.rearm_shell(pid),
        }
    }

    /// Force the current process out after `fault`.
    pub fn fault(&mut self, fault: Fault) -> FaultOutcome {
        let _irq = IrqGuard::acquire();
        let pid = match self.sched.current_pid() {
            Some(pid) if !pid.is_idle() => pid,
            _ => {
                crate::log_error!("fault: {} with no process to blame", fault);
                return FaultOutcome::Fatal;
            }
        };
        crate::log_warn!("fault: pid {} killed by {}", pid.0, fault);
        self.sched.raise_exception();
        match self.halt(0) {
            Ok(transfer) => FaultOutcome::Exit(transfer),
            Err(e) => {
                crate::log_error!("fault: could not reap pid {}: {}", pid.0, e);
                FaultOutcome::Fatal
            }
        }
    }

    fn spawn(&mut self, req: SpawnRequest<'_>) -> KernelResult<(Pid, u32)> {
        let pid = self.sched.pids.allocate_pid()?;
        let image = ProgramImage::open(&self.storage, req.name)?;
        let files = self.files.allocate()?;

        let pcb = match self.sched.pids.claim(pid) {
            Ok(pcb) => pcb,
            Err(e) => {
                self.files.free(files);
                return Err(e);
            }
        };
        pcb.state = ProcessState::Running;
        pcb.class = req.class;
        pcb.files = Some(files);
        pcb.terminal = req.terminal;
        pcb.parent = Some(req.parent);
        pcb.set_name(req.name);
        pcb.set_args(req.args);
        pcb.user_context = UserContext { eip: image.entry, esp: USER_STACK_TOP };
        if !req.parent.is_idle() {
            let parent = self.sched.pids.get_mut(req.parent)?;
            parent.child = Some(pid);
            parent.state = ProcessState::Uninterruptible;
        }

        if let Err(e) = self.enter_address_space(pid, req.terminal, &image, req.release_window) {
            self.rollback_spawn(pid, req.parent);
            return Err(e);
        }
        self.platform.set_kernel_stack(kernel_stack_top(pid));
        self.sched.add_runnable();
        self.sched.set_current(pid);
        Ok((pid, image.entry))
    }

    fn enter_address_space(
        &mut self,
        pid: Pid,
        terminal: TerminalId,
        image: &ProgramImage,
        release_window: bool,
    ) -> KernelResult<()> {
        let node = self.sched.queues.insert_back(terminal, pid)?;
        self.sched.pids.set_node(pid, Some(node));
        self.space
            .map_directory(&mut self.platform, process_frame(pid), USER_REGION, USER_REGION_FLAGS);
        if release_window {
            self.space.unmap_table_page(&mut self.platform, USER_VIDEO_ADDR)?;
        }
        loader::load(image, &self.storage, &mut self.platform)?;
        Ok(())
    }

    /// Undo a spawn that failed after its PID was claimed.
    fn rollback_spawn(&mut self, pid: Pid, parent: Pid) {
        if let (Some(node), Ok(pcb)) = (self.sched.pids.node(pid), self.sched.pids.get(pid)) {
            let terminal = pcb.terminal;
            if let Err(e) = self.sched.queues.remove(terminal, node) {
                crate::log_warn!("exec: rollback of pid {} left its queue node: {}", pid.0, e);
            }
        }
        if let Some(files) = self.sched.pids.release(pid) {
            self.files.free(files);
        }
        if let Ok(pcb) = self.sched.pids.get_mut(parent) {
            if pcb.child == Some(pid) {
                pcb.child = None;
            }
            pcb.state = ProcessState::Running;
        }
        if let Some(current) = self.sched.current_pid() {
            self.space.map_directory(
                &mut self.platform,
                process_frame(current),
                USER_REGION,
                USER_REGION_FLAGS,
            );
            let restore_window = self.sched.pids.get(current).map_or(false, |p| p.display_mapped);
            if restore_window {
                self.remap_window(current);
            }
        }
        crate::log_warn!("exec: pid {} rolled back", pid.0);
    }

    fn remap_window(&mut self, pid: Pid) {
        if let Ok(pcb) = self.sched.pids.get(pid) {
            let screen = self.terminals.screen_for(pcb.terminal);
            if let Err(e) = self.space.map_table_page(
                &mut self.platform,
                screen,
                USER_VIDEO_ADDR,
                USER_VIDEO_FLAGS,
            ) {
                crate::log_warn!("vidmap: could not restore window of pid {}: {}", pid.0, e);
            }
        }
    }

    fn close_descriptors(&mut self, pid: Pid) -> KernelResult<()> {
        let (files, session) = {
            let pcb = self.sched.pids.get(pid)?;
            (pcb.files, pcb.terminal)
        };
        if let Some(files) = files {
            let table = self.files.get_mut(files)?;
            let mut io = IoContext {
                storage: &mut self.storage,
                terminals: &mut self.terminals,
                platform: &mut self.platform,
                session,
            };
            table.close_all(&mut io);
        }
        Ok(())
    }

    fn rearm_shell(&mut self, pid: Pid) -> KernelResult<Transfer> {
        // A base shell has no parent to report a fault to.
        self.sched.take_exception();
        let (mapped, terminal) = {
            let pcb = self.sched.pids.get(pid)?;
            (pcb.display_mapped, pcb.terminal)
        };
        if mapped {
            self.space.unmap_table_page(&mut self.platform, USER_VIDEO_ADDR)?;
        }
        self.close_descriptors(pid)?;

        let image = ProgramImage::open(&self.storage, SHELL_NAME)?;
        self.space
            .map_directory(&mut self.platform, process_frame(pid), USER_REGION, USER_REGION_FLAGS);
        loader::load(&image, &self.storage, &mut self.platform)?;

        let pcb = self.sched.pids.get_mut(pid)?;
        pcb.display_mapped = false;
        pcb.state = ProcessState::Running;
        pcb.class = SchedClass::Interactive;
        pcb.child = None;
        pcb.set_name(SHELL_NAME);
        pcb.set_args(b"");
        pcb.user_context = UserContext { eip: image.entry, esp: USER_STACK_TOP };
        self.platform.set_kernel_stack(kernel_stack_top(pid));
        crate::log_info!("tty{}: base shell pid {} restarted", terminal, pid.0);
        Ok(Transfer::Restart { pid, entry: image.entry, stack: USER_STACK_TOP })
    }

    fn reap(&mut self, pid: Pid, parent: Pid, status: u8) -> KernelResult<Transfer> {
        self.sched.pids.get(parent)?;
        let (mapped, terminal) = {
            let pcb = self.sched.pids.get(pid)?;
            (pcb.display_mapped, pcb.terminal)
        };
        if mapped {
            self.space.unmap_table_page(&mut self.platform, USER_VIDEO_ADDR)?;
        }
        if let Some(node) = self.sched.pids.node(pid) {
            self.sched.queues.remove(terminal, node)?;
        }
        self.close_descriptors(pid)?;
        if let Some(files) = self.sched.pids.release(pid) {
            self.files.free(files);
        }
        self.sched.remove_runnable();

        let status = if self.sched.take_exception() {
            DIE_BY_EXCEPTION
        } else {
            i32::from(status)
        };
        let parent_mapped = {
            let pcb = self.sched.pids.get_mut(parent)?;
            pcb.child = None;
            pcb.child_status = Some(status);
            pcb.state = ProcessState::Running;
            pcb.display_mapped
        };
        self.sched.set_current(parent);
        self.space.map_directory(
            &mut self.platform,
            process_frame(parent),
            USER_REGION,
            USER_REGION_FLAGS,
        );
        if parent_mapped {
            self.remap_window(parent);
        }
        self.platform.set_kernel_stack(kernel_stack_top(parent));
        crate::log_info!("halt: pid {} exited with {}, resuming pid {}", pid.0, status, parent.0);
        Ok(Transfer::Resume { to: parent, status })
    }
}
