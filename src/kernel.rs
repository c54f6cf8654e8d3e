//! The kernel value.
//!
//! Every piece of mutable kernel state lives in one [`Kernel`], reached by
//! exclusive reference. Operations that touch the PID table, the run-queues
//! or the active mapping mask interrupts with an [`IrqGuard`] for their whole
//! body.

use crate::arch::Platform;
use crate::config::{NUM_TERMINALS, USER_REGION, USER_VIDEO_ADDR};
use crate::drivers::tty::{KeyInput, TerminalId, Terminals};
use crate::error::KernelResult;
use crate::fs::{FileTables, Storage};
use crate::memory::paging::{USER_REGION_FLAGS, USER_VIDEO_FLAGS};
use crate::memory::{kernel_stack_top, process_frame, AddressSpace};
use crate::scheduler::{Context, Pcb, Pid, PreemptTimer, SchedulerState};
use crate::sync::IrqGuard;

pub struct Kernel<P: Platform, S: Storage> {
    pub(crate) sched: SchedulerState,
    pub(crate) terminals: Terminals,
    pub(crate) space: AddressSpace,
    pub(crate) files: FileTables,
    pub(crate) timer: PreemptTimer,
    pub(crate) platform: P,
    pub(crate) storage: S,
}

impl<P: Platform, S: Storage> Kernel<P, S> {
    pub fn new(platform: P, storage: S) -> Self {
        Kernel {
            sched: SchedulerState::new(),
            terminals: Terminals::new(),
            space: AddressSpace::new(),
            files: FileTables::new(),
            timer: PreemptTimer::new(),
            platform,
            storage,
        }
    }

    /// Bring up the idle task and the kernel mappings.
    ///
    /// Must be called once the kernel value has reached its final address:
    /// the page directory is loaded from where it sits.
    pub fn boot(&mut self) -> KernelResult<()> {
        let _irq = IrqGuard::acquire();
        let files = self.files.allocate()?;
        self.sched.pids.init_idle(files)?;
        self.sched.set_current(Pid::IDLE);
        self.space.init_kernel(&mut self.platform)?;
        self.space.map_directory(
            &mut self.platform,
            process_frame(Pid::IDLE),
            USER_REGION,
            USER_REGION_FLAGS,
        );
        self.platform.set_kernel_stack(kernel_stack_top(Pid::IDLE));
        crate::log_info!("kernel: idle task up, {} terminal sessions", NUM_TERMINALS);
        Ok(())
    }

    pub fn current_pid(&self) -> Option<Pid> {
        self.sched.current_pid()
    }

    pub fn pcb(&self, pid: Pid) -> KernelResult<&Pcb> {
        self.sched.pids.get(pid)
    }

    pub fn scheduler(&self) -> &SchedulerState {
        &self.sched
    }

    pub fn terminals(&self) -> &Terminals {
        &self.terminals
    }

    pub fn address_space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn files(&self) -> &FileTables {
        &self.files
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Where the kernel context of `pid` is saved. The pointer stays valid as
    /// long as the kernel value is not moved.
    pub fn kernel_context_ptr(&mut self, pid: Pid) -> KernelResult<*mut Context> {
        Ok(&mut self.sched.pids.get_mut(pid)?.kernel_context as *mut Context)
    }

    /// Feed one decoded key press to the terminal layer.
    pub fn key_input(&mut self, key: KeyInput) -> KernelResult<()> {
        let _irq = IrqGuard::acquire();
        match key {
            KeyInput::SwitchTerminal(target) => self.switch_foreground(target),
            other => {
                self.terminals.key_input(other, &mut self.platform);
                Ok(())
            }
        }
    }

    /// Bring session `target` to the physical screen.
    ///
    /// A running process holding the display window keeps seeing its own
    /// session, which may just have moved on or off screen.
    pub fn switch_foreground(&mut self, target: TerminalId) -> KernelResult<()> {
        let _irq = IrqGuard::acquire();
        if !self.terminals.switch_foreground(target, &mut self.platform)? {
            return Ok(());
        }
        if let Ok(pcb) = self.sched.current_pcb() {
            if pcb.display_mapped {
                let screen = self.terminals.screen_for(pcb.terminal);
                self.space
                    .map_table_page(&mut self.platform, screen, USER_VIDEO_ADDR, USER_VIDEO_FLAGS)?;
            }
        }
        crate::log_info!("tty: session {} in front", target);
        Ok(())
    }
}
