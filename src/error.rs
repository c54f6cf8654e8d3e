use core::fmt;

/// Kernel error types.
///
/// Every fallible operation of the scheduler, the process lifecycle and the
/// descriptor layer reports one of these. At the system-call boundary they
/// all collapse into the `-1` status user programs see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    // ── resource exhaustion ──
    PidExhausted,
    ProcessLimit,
    NoFileTable,
    DescriptorTableFull,

    // ── validation ──
    InvalidCommand,
    NotFound,
    BadImage,
    BadDescriptor,
    BadAddress,
    InvalidArgument,
    NoArguments,
    BufferTooSmall,
    SessionDisabled,
    Unsupported,

    // ── scheduler state ──
    NoCurrentProcess,
    NoRunnableTask,
    IdleTarget,
    UnknownNode,
    SentinelRemoval,
    MissingPageTable,

    // ── device / collaborator ──
    WouldBlock,
    Io,
}

impl KernelError {
    /// Status returned to user space for a failed system call.
    pub const fn as_status(self) -> i32 {
        -1
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KernelError::PidExhausted => write!(f, "No free process identifier"),
            KernelError::ProcessLimit => write!(f, "Too many runnable processes"),
            KernelError::NoFileTable => write!(f, "No free file table"),
            KernelError::DescriptorTableFull => write!(f, "Too many open files"),
            KernelError::InvalidCommand => write!(f, "Invalid command line"),
            KernelError::NotFound => write!(f, "No such file or directory"),
            KernelError::BadImage => write!(f, "Malformed image"),
            KernelError::BadDescriptor => write!(f, "Bad file descriptor"),
            KernelError::BadAddress => write!(f, "Bad user address"),
            KernelError::InvalidArgument => write!(f, "Invalid argument"),
            KernelError::NoArguments => write!(f, "No arguments supplied"),
            KernelError::BufferTooSmall => write!(f, "Buffer too small"),
            KernelError::SessionDisabled => write!(f, "Terminal session disabled"),
            KernelError::Unsupported => write!(f, "Operation not supported"),
            KernelError::NoCurrentProcess => write!(f, "No current process"),
            KernelError::NoRunnableTask => write!(f, "No runnable task"),
            KernelError::IdleTarget => write!(f, "Cannot switch to the idle task"),
            KernelError::UnknownNode => write!(f, "Unknown run-queue node"),
            KernelError::SentinelRemoval => write!(f, "Cannot remove run-queue sentinel"),
            KernelError::MissingPageTable => write!(f, "No page table backs this address"),
            KernelError::WouldBlock => write!(f, "Operation would block"),
            KernelError::Io => write!(f, "I/O error"),
        }
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
