use super::runqueue::NodeId;
use super::Transfer;
use crate::arch::Platform;
use crate::config::{USER_REGION, USER_VIDEO_ADDR};
use crate::error::{KernelError, KernelResult};
use crate::fs::Storage;
use crate::kernel::Kernel;
use crate::memory::paging::{USER_REGION_FLAGS, USER_VIDEO_FLAGS};
use crate::memory::{kernel_stack_top, process_frame};
use crate::sync::IrqGuard;

impl<P: Platform, S: Storage> Kernel<P, S> {
    /// Hand the CPU to the task scheduled by `node`.
    ///
    /// A sentinel node is skipped once, so a rotation that lands on an empty
    /// slot of the ring still reaches a real task. Everything is validated
    /// before the first mutation: a failed switch leaves no trace. On success
    /// the display ownership, the user display window, the user region slot
    /// and the ring-0 stack all belong to the target, and the returned
    /// [`Transfer::Switch`] tells the caller which saved contexts to swap.
    pub fn switch_task(&mut self, node: NodeId) -> KernelResult<Transfer> {
        let _irq = IrqGuard::acquire();
        let from = self.sched.current()?;

        let mut target = node;
        if self.sched.queues.pid_at(target)?.is_none() {
            target = self.sched.queues.next(target)?;
        }
        let to = self
            .sched
            .queues
            .pid_at(target)?
            .ok_or(KernelError::NoRunnableTask)?;
        if to.is_idle() {
            return Err(KernelError::IdleTarget);
        }
        let (from_session, from_mapped) = {
            let pcb = self.sched.pids.get(from)?;
            (pcb.terminal, pcb.display_mapped)
        };
        let (to_session, to_mapped) = {
            let pcb = self.sched.pids.get(to)?;
            (pcb.terminal, pcb.display_mapped)
        };

        self.terminals.save_display(from_session);
        self.terminals.restore_display(to_session);
        let screen = self.terminals.screen_for(to_session);
        self.terminals.set_display_base(screen);

        if to_mapped {
            self.space
                .map_table_page(&mut self.platform, screen, USER_VIDEO_ADDR, USER_VIDEO_FLAGS)?;
        } else if from_mapped {
            self.space.unmap_table_page(&mut self.platform, USER_VIDEO_ADDR)?;
        }

        self.sched.set_current(to);
        self.sched.count_switch();
        self.space
            .map_directory(&mut self.platform, process_frame(to), USER_REGION, USER_REGION_FLAGS);
        self.platform.set_kernel_stack(kernel_stack_top(to));
        Ok(Transfer::Switch { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{USER_LOAD_ADDR, VIDEO_MEMORY};
    use crate::memory::shadow_screen;
    use crate::scheduler::task::Pid;
    use crate::testing::booted;

    #[test]
    fn switch_installs_target_state() {
        let mut kernel = booted();
        let node = kernel.sched.queues.last(0);
        let from = kernel.current_pid().unwrap();
        let transfer = kernel.switch_task(node).unwrap();
        assert_eq!(transfer, Transfer::Switch { from, to: Pid(1) });
        assert_eq!(kernel.current_pid(), Some(Pid(1)));
        assert_eq!(kernel.scheduler().switches(), 1);
        assert_eq!(
            kernel.address_space().translate(USER_LOAD_ADDR),
            Some(process_frame(Pid(1)) + (USER_LOAD_ADDR - USER_REGION))
        );
        assert_eq!(kernel.platform().last_kernel_stack(), Some(kernel_stack_top(Pid(1))));
        assert_eq!(kernel.terminals().live_owner(), 0);
        assert_eq!(kernel.terminals().display_base(), VIDEO_MEMORY);
    }

    #[test]
    fn there_and_back_restores_display_context() {
        let mut kernel = booted();
        let a = kernel.sched.queues.last(2);
        let b = kernel.sched.queues.last(0);
        kernel.switch_task(a).unwrap();
        kernel.terminals.live_mut().x = 12;
        kernel.terminals.live_mut().y = 7;
        let before = *kernel.terminals().live();

        kernel.switch_task(b).unwrap();
        assert_ne!(*kernel.terminals().live(), before);
        kernel.switch_task(a).unwrap();
        assert_eq!(*kernel.terminals().live(), before);
        assert_eq!(kernel.terminals().display_base(), shadow_screen(2));
    }

    #[test]
    fn sentinel_advances_to_first_task() {
        let mut kernel = booted();
        let sentinel = kernel.sched.queues.sentinel(1);
        let transfer = kernel.switch_task(sentinel).unwrap();
        assert!(matches!(transfer, Transfer::Switch { to: Pid(2), .. }));
    }

    #[test]
    fn empty_ring_has_nothing_to_run() {
        let mut kernel = crate::testing::booted_with_sessions(1);
        let sentinel = kernel.sched.queues.sentinel(2);
        let flushes = kernel.platform().flushes;
        assert_eq!(kernel.switch_task(sentinel), Err(KernelError::NoRunnableTask));
        assert_eq!(kernel.platform().flushes, flushes);
    }

    #[test]
    fn idle_task_is_never_a_target() {
        let mut kernel = booted();
        kernel.sched.queues.insert_back(1, Pid::IDLE).unwrap();
        let node = kernel.sched.queues.last(1);
        let flushes = kernel.platform().flushes;
        let current = kernel.current_pid();
        assert_eq!(kernel.switch_task(node), Err(KernelError::IdleTarget));
        assert_eq!(kernel.platform().flushes, flushes);
        assert_eq!(kernel.current_pid(), current);
        assert_eq!(kernel.scheduler().switches(), 0);
    }

    #[test]
    fn display_window_follows_the_target() {
        let mut kernel = booted();
        let session0 = kernel.sched.queues.last(0);
        let session1 = kernel.sched.queues.last(1);

        // Both hold the window: it is re-pointed at the target's screen.
        kernel.switch_task(session1).unwrap();
        kernel.map_display(USER_LOAD_ADDR).unwrap();
        kernel.switch_task(session0).unwrap();
        kernel.map_display(USER_LOAD_ADDR).unwrap();
        kernel.switch_task(session1).unwrap();
        assert_eq!(kernel.address_space().translate(USER_VIDEO_ADDR), Some(shadow_screen(1)));

        // Only the current one holds it: it is unmapped.
        kernel.sched.pids.get_mut(Pid(1)).unwrap().display_mapped = false;
        kernel.switch_task(session0).unwrap();
        assert_eq!(kernel.address_space().translate(USER_VIDEO_ADDR), None);

        // Neither holds it: nothing to flush beyond the region remap.
        let flushes = kernel.platform().flushes;
        kernel.sched.pids.get_mut(Pid(2)).unwrap().display_mapped = false;
        kernel.switch_task(session1).unwrap();
        assert_eq!(kernel.platform().flushes, flushes + 1);
    }

    #[test]
    fn unknown_node_is_rejected() {
        let mut kernel = booted();
        let stale = NodeId::for_pid(Pid(40));
        assert_eq!(kernel.switch_task(stale), Err(KernelError::UnknownNode));
    }
}
