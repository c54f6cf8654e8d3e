pub mod context;
pub mod preempt;
pub mod runqueue;
pub mod switch;
pub mod task;

pub use context::{Context, UserContext};
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use context::{enter_user, launch_user, resume_context, switch_context};
pub use preempt::{PreemptTimer, TickPhase};
pub use runqueue::{NodeId, RunQueues};
pub use task::{Pcb, Pid, PidTable, ProcessState, SchedClass};

use crate::error::{KernelError, KernelResult};

/// How control must leave the kernel after a scheduling decision.
///
/// Scheduler operations only update bookkeeping; the interrupt glue turns
/// the returned transfer into the matching context-switch trampoline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    /// Save `from`'s kernel context and resume `to`'s.
    Switch { from: Pid, to: Pid },
    /// Save `from`'s kernel context and enter `to` in user mode for the
    /// first time.
    Launch { from: Pid, to: Pid, entry: u32, stack: u32 },
    /// Resume `to` where it launched its child, handing it `status`. The
    /// running frame is abandoned.
    Resume { to: Pid, status: i32 },
    /// Re-enter `pid` in user mode from scratch, abandoning its frames.
    Restart { pid: Pid, entry: u32, stack: u32 },
}

/// The scheduler's global state.
pub struct SchedulerState {
    pub pids: PidTable,
    pub queues: RunQueues,
    /// Process owning the CPU.
    current: Option<Pid>,
    /// User processes holding a run-queue node, base shells included.
    runnable: usize,
    switches: u64,
    /// Set by the fault path before forcing an exit.
    exception_pending: bool,
}

impl SchedulerState {
    pub fn new() -> Self {
        SchedulerState {
            pids: PidTable::new(),
            queues: RunQueues::new(),
            current: None,
            runnable: 0,
            switches: 0,
            exception_pending: false,
        }
    }

    pub fn current(&self) -> KernelResult<Pid> {
        self.current.ok_or(KernelError::NoCurrentProcess)
    }

    pub fn current_pid(&self) -> Option<Pid> {
        self.current
    }

    pub fn set_current(&mut self, pid: Pid) {
        self.current = Some(pid);
    }

    pub fn current_pcb(&self) -> KernelResult<&Pcb> {
        self.pids.get(self.current()?)
    }

    pub fn current_pcb_mut(&mut self) -> KernelResult<&mut Pcb> {
        let pid = self.current()?;
        self.pids.get_mut(pid)
    }

    pub fn runnable(&self) -> usize {
        self.runnable
    }

    pub(crate) fn add_runnable(&mut self) {
        self.runnable += 1;
    }

    pub(crate) fn remove_runnable(&mut self) {
        self.runnable = self.runnable.saturating_sub(1);
    }

    /// Number of completed task switches since boot.
    pub fn switches(&self) -> u64 {
        self.switches
    }

    pub(crate) fn count_switch(&mut self) {
        self.switches += 1;
    }

    pub fn raise_exception(&mut self) {
        self.exception_pending = true;
    }

    /// Consume the exception flag. Returns whether it was set.
    pub fn take_exception(&mut self) -> bool {
        core::mem::replace(&mut self.exception_pending, false)
    }
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::new()
    }
}
