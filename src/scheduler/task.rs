use bit_field::BitArray;
use heapless::Vec;

use super::context::{Context, UserContext};
use super::runqueue::NodeId;
use crate::config::{COMMAND_ARGS_LEN, COMMAND_NAME_LEN, MAX_PIDS};
use crate::drivers::tty::TerminalId;
use crate::error::{KernelError, KernelResult};
use crate::fs::FileTableId;

/// Process identifier; an index into the PID table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u16);

impl Pid {
    /// The idle task. It exists from boot and is never scheduled by the
    /// preemption loop.
    pub const IDLE: Pid = Pid(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_idle(self) -> bool {
        self == Pid::IDLE
    }
}

/// Process state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Blocked on input; woken by an interrupt.
    Interruptible,
    /// Blocked until a child exits.
    Uninterruptible,
    Stopped,
    Zombie,
}

/// Scheduling class. The run-queues ignore it; it records what kind of
/// work the process last asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedClass {
    Kernel,
    RealTime,
    Interactive,
    Regular,
}

/// Process control block.
#[derive(Debug)]
pub struct Pcb {
    pub pid: Pid,
    pub state: ProcessState,
    pub class: SchedClass,
    pub kernel_context: Context,
    pub user_context: UserContext,
    pub files: Option<FileTableId>,
    pub terminal: TerminalId,
    /// The process asked for the display window at `USER_VIDEO_ADDR`.
    pub display_mapped: bool,
    pub parent: Option<Pid>,
    pub child: Option<Pid>,
    /// Exit status of the last child reaped.
    pub child_status: Option<i32>,
    pub name: Vec<u8, COMMAND_NAME_LEN>,
    pub args: Vec<u8, COMMAND_ARGS_LEN>,
}

impl Pcb {
    pub const fn new(pid: Pid) -> Self {
        Pcb {
            pid,
            state: ProcessState::Stopped,
            class: SchedClass::Regular,
            kernel_context: Context::empty(),
            user_context: UserContext::empty(),
            files: None,
            terminal: 0,
            display_mapped: false,
            parent: None,
            child: None,
            child_status: None,
            name: Vec::new(),
            args: Vec::new(),
        }
    }

    pub fn set_name(&mut self, name: &[u8]) {
        self.name.clear();
        for &b in name.iter().take(COMMAND_NAME_LEN) {
            let _ = self.name.push(b);
        }
    }

    pub fn set_args(&mut self, args: &[u8]) {
        self.args.clear();
        for &b in args.iter().take(COMMAND_ARGS_LEN) {
            let _ = self.args.push(b);
        }
    }
}

#[derive(Debug)]
pub struct PidSlot {
    pub pcb: Pcb,
    /// Run-queue node scheduling this process, if enqueued.
    pub node: Option<NodeId>,
}

const BITMAP_WORDS: usize = MAX_PIDS / 32;

/// Fixed table of every PCB, indexed by PID.
pub struct PidTable {
    slots: [PidSlot; MAX_PIDS],
    bitmap: [u32; BITMAP_WORDS],
    /// Last PID handed out; the next scan starts here.
    cursor: usize,
}

impl PidTable {
    pub fn new() -> Self {
        PidTable {
            slots: core::array::from_fn(|i| PidSlot { pcb: Pcb::new(Pid(i as u16)), node: None }),
            bitmap: [0; BITMAP_WORDS],
            cursor: 0,
        }
    }

    /// Find a free PID, scanning from the last one handed out and wrapping.
    /// The PID is not reserved until [`PidTable::claim`].
    pub fn allocate_pid(&self) -> KernelResult<Pid> {
        (0..MAX_PIDS)
            .map(|offset| (self.cursor + offset) % MAX_PIDS)
            .find(|&i| !self.bitmap[..].get_bit(i))
            .map(|i| Pid(i as u16))
            .ok_or(KernelError::PidExhausted)
    }

    /// Mark `pid` in use and hand back its freshly reset PCB.
    pub fn claim(&mut self, pid: Pid) -> KernelResult<&mut Pcb> {
        let index = pid.index();
        if index >= MAX_PIDS || self.bitmap[..].get_bit(index) {
            return Err(KernelError::InvalidArgument);
        }
        self.bitmap[..].set_bit(index, true);
        self.cursor = index;
        let slot = &mut self.slots[index];
        slot.pcb = Pcb::new(pid);
        slot.node = None;
        Ok(&mut slot.pcb)
    }

    /// Free `pid` and tear its PCB down. Releasing a free PID does nothing.
    /// Returns the file table the process was bound to, for the caller to
    /// give back to the pool.
    pub fn release(&mut self, pid: Pid) -> Option<FileTableId> {
        let index = pid.index();
        if index >= MAX_PIDS || !self.bitmap[..].get_bit(index) {
            return None;
        }
        self.bitmap[..].set_bit(index, false);
        let slot = &mut self.slots[index];
        let files = slot.pcb.files.take();
        slot.pcb.name.clear();
        slot.pcb.args.clear();
        slot.pcb.parent = None;
        slot.pcb.child = None;
        slot.pcb.child_status = None;
        slot.pcb.display_mapped = false;
        slot.pcb.state = ProcessState::Stopped;
        slot.node = None;
        files
    }

    /// Claim PID 0 for the idle task, bound to `files` and session 0. The
    /// next user allocation starts scanning right after it.
    pub fn init_idle(&mut self, files: FileTableId) -> KernelResult<&mut Pcb> {
        let pcb = self.claim(Pid::IDLE)?;
        pcb.state = ProcessState::Running;
        pcb.class = SchedClass::Kernel;
        pcb.files = Some(files);
        pcb.terminal = 0;
        Ok(pcb)
    }

    pub fn is_active(&self, pid: Pid) -> bool {
        pid.index() < MAX_PIDS && self.bitmap[..].get_bit(pid.index())
    }

    pub fn get(&self, pid: Pid) -> KernelResult<&Pcb> {
        if !self.is_active(pid) {
            return Err(KernelError::NoCurrentProcess);
        }
        Ok(&self.slots[pid.index()].pcb)
    }

    pub fn get_mut(&mut self, pid: Pid) -> KernelResult<&mut Pcb> {
        if !self.is_active(pid) {
            return Err(KernelError::NoCurrentProcess);
        }
        Ok(&mut self.slots[pid.index()].pcb)
    }

    pub fn node(&self, pid: Pid) -> Option<NodeId> {
        self.slots.get(pid.index()).and_then(|s| s.node)
    }

    pub fn set_node(&mut self, pid: Pid, node: Option<NodeId>) {
        if let Some(slot) = self.slots.get_mut(pid.index()) {
            slot.node = node;
        }
    }

    pub fn active_count(&self) -> usize {
        self.bitmap.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn bitmap(&self) -> &[u32] {
        &self.bitmap
    }
}

impl Default for PidTable {
    fn default() -> Self {
        Self::new()
    }
}
