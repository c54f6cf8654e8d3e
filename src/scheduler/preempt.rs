//! Timer-driven rotation between terminal sessions.
//!
//! The first ticks bring the sessions up one at a time, each followed by a
//! quiet window in which the fresh shell runs undisturbed. From then on every
//! tick moves the CPU to the next session in index order, running that
//! session's most recently enqueued task.

use super::runqueue::NodeId;
use super::Transfer;
use crate::arch::Platform;
use crate::config::{BOOTSTRAP_SPACING, NUM_TERMINALS, ROTATION_START, TIMER_IRQ};
use crate::drivers::tty::TerminalId;
use crate::error::KernelResult;
use crate::fs::Storage;
use crate::kernel::Kernel;
use crate::sync::IrqGuard;

/// What a given tick is spent on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    /// Attach the base shell of this session, unless it already has one.
    Bootstrap(TerminalId),
    /// Let the last attached shell run.
    Settle,
    /// Round-robin across sessions.
    Rotate,
}

impl TickPhase {
    pub fn of(tick: u32) -> TickPhase {
        if tick >= ROTATION_START {
            TickPhase::Rotate
        } else if tick % BOOTSTRAP_SPACING == 0 {
            TickPhase::Bootstrap((tick / BOOTSTRAP_SPACING) as TerminalId)
        } else {
            TickPhase::Settle
        }
    }
}

#[derive(Debug, Default)]
pub struct PreemptTimer {
    ticks: u32,
    /// Tail node of each session at the last rotation.
    active: [Option<NodeId>; NUM_TERMINALS],
}

impl PreemptTimer {
    pub const fn new() -> Self {
        PreemptTimer { ticks: 0, active: [None; NUM_TERMINALS] }
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn active(&self, session: TerminalId) -> Option<NodeId> {
        self.active.get(session).copied().flatten()
    }

    fn advance(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }
}

impl<P: Platform, S: Storage> Kernel<P, S> {
    /// Timer interrupt body.
    ///
    /// Returns the transfer the interrupt glue must perform before returning
    /// from the interrupt, if any. The tick is counted and the interrupt
    /// acknowledged on every path, failures included.
    pub fn on_timer_tick(&mut self) -> KernelResult<Option<Transfer>> {
        let _irq = IrqGuard::acquire();
        let phase = TickPhase::of(self.timer.ticks);
        let result = match phase {
            TickPhase::Bootstrap(session) => self.bootstrap_session(session),
            TickPhase::Settle => Ok(None),
            TickPhase::Rotate => self.rotate_sessions(),
        };
        self.timer.advance();
        self.platform.end_of_interrupt(TIMER_IRQ);
        result
    }

    fn bootstrap_session(&mut self, session: TerminalId) -> KernelResult<Option<Transfer>> {
        if session >= NUM_TERMINALS || self.terminals.session(session).bootstrapped {
            return Ok(None);
        }
        self.attach_shell(session).map(Some)
    }

    fn rotate_sessions(&mut self) -> KernelResult<Option<Transfer>> {
        for session in 0..NUM_TERMINALS {
            let queues = &self.sched.queues;
            self.timer.active[session] =
                (!queues.is_empty(session)).then(|| queues.last(session));
        }
        let current = self.sched.current_pcb()?;
        let next = (current.terminal + 1) % NUM_TERMINALS;
        match self.timer.active[next] {
            Some(node) => self.switch_task(node).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KernelError;
    use crate::scheduler::task::Pid;
    use crate::testing::{booted, booted_with_sessions, MemStorage, MockPlatform};
    use std::vec::Vec;

    fn queue_snapshot(kernel: &Kernel<MockPlatform, MemStorage>) -> Vec<Vec<Pid>> {
        (0..NUM_TERMINALS)
            .map(|s| kernel.sched.queues.iter(s).collect())
            .collect()
    }

    #[test]
    fn phases_partition_the_first_ticks() {
        assert_eq!(TickPhase::of(0), TickPhase::Bootstrap(0));
        assert_eq!(TickPhase::of(10), TickPhase::Bootstrap(1));
        assert_eq!(TickPhase::of(20), TickPhase::Bootstrap(2));
        for tick in (1..10).chain(11..20).chain(21..30) {
            assert_eq!(TickPhase::of(tick), TickPhase::Settle);
        }
        assert_eq!(TickPhase::of(30), TickPhase::Rotate);
        assert_eq!(TickPhase::of(u32::MAX), TickPhase::Rotate);
    }

    #[test]
    fn first_ticks_bootstrap_every_session() {
        let mut kernel = Box::new(Kernel::new(MockPlatform::default(), MemStorage::standard()));
        kernel.boot().unwrap();
        let mut launched = Vec::new();
        for _ in 0..ROTATION_START {
            if let Some(Transfer::Launch { to, .. }) = kernel.on_timer_tick().unwrap() {
                launched.push((kernel.timer.ticks() - 1, to));
            }
        }
        assert_eq!(launched, vec![(0, Pid(1)), (10, Pid(2)), (20, Pid(3))]);
        assert_eq!(kernel.platform().eois, vec![TIMER_IRQ; ROTATION_START as usize]);
        for session in 0..NUM_TERMINALS {
            assert!(kernel.terminals().session(session).bootstrapped);
            assert_eq!(kernel.sched.queues.len(session), 1);
        }
        assert_eq!(kernel.scheduler().switches(), 0);
    }

    #[test]
    fn rotation_visits_the_next_session_only() {
        let mut kernel = booted();
        kernel.timer.ticks = ROTATION_START;
        let session0 = kernel.sched.queues.last(0);
        kernel.switch_task(session0).unwrap();
        let switches = kernel.scheduler().switches();
        let before = queue_snapshot(&kernel);

        let transfer = kernel.on_timer_tick().unwrap();
        assert_eq!(transfer, Some(Transfer::Switch { from: Pid(1), to: Pid(2) }));
        assert_eq!(kernel.scheduler().switches(), switches + 1);
        assert_eq!(queue_snapshot(&kernel), before);
        assert_eq!(kernel.timer.active(1), Some(kernel.sched.queues.last(1)));
    }

    #[test]
    fn rotation_runs_the_newest_task_of_a_session() {
        let mut kernel = booted();
        kernel.timer.ticks = ROTATION_START;
        let session0 = kernel.sched.queues.last(0);
        kernel.switch_task(session0).unwrap();
        let child = match kernel.execute(b"grep foo").unwrap() {
            Transfer::Launch { to, .. } => to,
            other => panic!("unexpected {:?}", other),
        };
        kernel.on_timer_tick().unwrap();
        kernel.on_timer_tick().unwrap();
        let transfer = kernel.on_timer_tick().unwrap();
        assert_eq!(transfer, Some(Transfer::Switch { from: Pid(3), to: child }));
    }

    #[test]
    fn empty_next_session_is_skipped() {
        let mut kernel = booted_with_sessions(1);
        kernel.timer.ticks = ROTATION_START;
        assert_eq!(kernel.on_timer_tick(), Ok(None));
        assert_eq!(kernel.current_pid(), Some(Pid(1)));
        assert_eq!(kernel.platform().eois, vec![TIMER_IRQ]);
    }

    #[test]
    fn failures_still_acknowledge_the_interrupt() {
        let mut kernel = Box::new(Kernel::new(MockPlatform::default(), MemStorage::standard()));
        kernel.timer.ticks = ROTATION_START;
        assert_eq!(kernel.on_timer_tick(), Err(KernelError::NoCurrentProcess));
        assert_eq!(kernel.platform().eois, vec![TIMER_IRQ]);
        assert_eq!(kernel.timer.ticks(), ROTATION_START + 1);
    }

    #[test]
    fn counter_saturates() {
        let mut kernel = booted();
        kernel.timer.ticks = u32::MAX;
        kernel.on_timer_tick().unwrap();
        assert_eq!(kernel.timer.ticks(), u32::MAX);
    }
}
