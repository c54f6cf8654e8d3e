//! Per-session run-queues.
//!
//! All queues share one arena of nodes. Node `p` always schedules PID `p`,
//! and the last `NUM_TERMINALS` nodes are the sessions' sentinels, so a node
//! handle never dangles: a released PID simply leaves its node unlinked.

use super::task::Pid;
use crate::config::{MAX_PIDS, NUM_TERMINALS};
use crate::drivers::tty::TerminalId;
use crate::error::{KernelError, KernelResult};

const NODE_COUNT: usize = MAX_PIDS + NUM_TERMINALS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeId(u16);

impl NodeId {
    pub fn for_pid(pid: Pid) -> NodeId {
        NodeId(pid.0)
    }

    fn sentinel(session: TerminalId) -> NodeId {
        NodeId((MAX_PIDS + session) as u16)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    pid: Option<Pid>,
    prev: NodeId,
    next: NodeId,
    queue: Option<TerminalId>,
}

impl Node {
    const fn unlinked(id: NodeId) -> Self {
        Node { pid: None, prev: id, next: id, queue: None }
    }
}

pub struct RunQueues {
    nodes: [Node; NODE_COUNT],
}

impl RunQueues {
    /// One empty circular list per session, each holding just its sentinel.
    pub fn new() -> Self {
        let mut nodes: [Node; NODE_COUNT] =
            core::array::from_fn(|i| Node::unlinked(NodeId(i as u16)));
        for session in 0..NUM_TERMINALS {
            nodes[NodeId::sentinel(session).index()].queue = Some(session);
        }
        RunQueues { nodes }
    }

    pub fn sentinel(&self, session: TerminalId) -> NodeId {
        NodeId::sentinel(session)
    }

    pub fn is_sentinel(&self, node: NodeId) -> bool {
        node.index() >= MAX_PIDS && node.index() < NODE_COUNT
    }

    /// Most recently enqueued node, or the sentinel when the queue is empty.
    pub fn last(&self, session: TerminalId) -> NodeId {
        self.nodes[NodeId::sentinel(session).index()].prev
    }

    pub fn is_empty(&self, session: TerminalId) -> bool {
        self.last(session) == NodeId::sentinel(session)
    }

    /// Number of real members, found by walking the ring.
    pub fn len(&self, session: TerminalId) -> usize {
        self.iter(session).count()
    }

    /// PIDs queued on `session`, oldest first.
    pub fn iter(&self, session: TerminalId) -> impl Iterator<Item = Pid> + '_ {
        let sentinel = NodeId::sentinel(session);
        let mut cursor = self.nodes[sentinel.index()].next;
        core::iter::from_fn(move || {
            if cursor == sentinel {
                return None;
            }
            let node = self.nodes[cursor.index()];
            cursor = node.next;
            node.pid
        })
    }

    pub fn next(&self, node: NodeId) -> KernelResult<NodeId> {
        Ok(self.linked(node)?.next)
    }

    /// PID a node schedules; `None` for a sentinel.
    pub fn pid_at(&self, node: NodeId) -> KernelResult<Option<Pid>> {
        Ok(self.linked(node)?.pid)
    }

    /// Append `pid` before the sentinel of `session`.
    pub fn insert_back(&mut self, session: TerminalId, pid: Pid) -> KernelResult<NodeId> {
        if session >= NUM_TERMINALS || pid.index() >= MAX_PIDS {
            return Err(KernelError::InvalidArgument);
        }
        let node = NodeId::for_pid(pid);
        if self.nodes[node.index()].queue.is_some() {
            return Err(KernelError::InvalidArgument);
        }
        let sentinel = NodeId::sentinel(session);
        let tail = self.nodes[sentinel.index()].prev;
        self.nodes[node.index()] = Node { pid: Some(pid), prev: tail, next: sentinel, queue: Some(session) };
        self.nodes[tail.index()].next = node;
        self.nodes[sentinel.index()].prev = node;
        Ok(node)
    }

    /// Unlink `node` from `session`. The sentinel can never be removed.
    pub fn remove(&mut self, session: TerminalId, node: NodeId) -> KernelResult<()> {
        if self.is_sentinel(node) {
            return Err(KernelError::SentinelRemoval);
        }
        let entry = *self.linked(node)?;
        if entry.queue != Some(session) {
            return Err(KernelError::UnknownNode);
        }
        self.nodes[entry.prev.index()].next = entry.next;
        self.nodes[entry.next.index()].prev = entry.prev;
        self.nodes[node.index()] = Node::unlinked(node);
        Ok(())
    }

    fn linked(&self, node: NodeId) -> KernelResult<&Node> {
        self.nodes
            .get(node.index())
            .filter(|n| n.queue.is_some())
            .ok_or(KernelError::UnknownNode)
    }
}

impl Default for RunQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_queues_hold_only_sentinels() {
        let q = RunQueues::new();
        for s in 0..NUM_TERMINALS {
            assert!(q.is_empty(s));
            assert_eq!(q.len(s), 0);
            assert_eq!(q.last(s), q.sentinel(s));
            assert_eq!(q.pid_at(q.sentinel(s)), Ok(None));
            assert_eq!(q.next(q.sentinel(s)), Ok(q.sentinel(s)));
        }
    }

    #[test]
    fn insert_back_appends_and_tracks_last() {
        let mut q = RunQueues::new();
        let a = q.insert_back(1, Pid(1)).unwrap();
        let b = q.insert_back(1, Pid(4)).unwrap();
        assert_eq!(q.last(1), b);
        assert_eq!(q.len(1), 2);
        assert_eq!(q.iter(1).collect::<Vec<_>>(), vec![Pid(1), Pid(4)]);
        assert_eq!(q.next(a), Ok(b));
        assert_eq!(q.next(b), Ok(q.sentinel(1)));
        assert!(q.is_empty(0));
    }

    #[test]
    fn remove_relinks_neighbours() {
        let mut q = RunQueues::new();
        let a = q.insert_back(0, Pid(1)).unwrap();
        let b = q.insert_back(0, Pid(2)).unwrap();
        let c = q.insert_back(0, Pid(3)).unwrap();
        q.remove(0, b).unwrap();
        assert_eq!(q.next(a), Ok(c));
        assert_eq!(q.pid_at(b), Err(KernelError::UnknownNode));
        q.remove(0, c).unwrap();
        assert_eq!(q.last(0), a);
        q.remove(0, a).unwrap();
        assert!(q.is_empty(0));
    }

    #[test]
    fn sentinel_is_never_removed() {
        let mut q = RunQueues::new();
        q.insert_back(2, Pid(7)).unwrap();
        let s = q.sentinel(2);
        assert_eq!(q.remove(2, s), Err(KernelError::SentinelRemoval));
        assert_eq!(q.len(2), 1);
    }

    #[test]
    fn node_belongs_to_one_queue() {
        let mut q = RunQueues::new();
        let n = q.insert_back(0, Pid(5)).unwrap();
        assert_eq!(q.insert_back(1, Pid(5)), Err(KernelError::InvalidArgument));
        assert_eq!(q.remove(1, n), Err(KernelError::UnknownNode));
        q.remove(0, n).unwrap();
        assert_eq!(q.insert_back(1, Pid(5)), Ok(n));
    }
}
