//! Task definition — static, no-alloc task descriptors
//!
//! A task is a schedulable unit with a priority, a lifecycle state and a body
//! that the kernel runs one slice at a time. The descriptor also records what
//! the task is waiting on while Blocked and the result it will see on wake-up.

use heapless::Vec;

use crate::config::{MAX_ITEM_SIZE, MAX_PRIORITIES, PARAM_BYTES};
use crate::error::Error;
use crate::heap::Region;
use crate::queue::QueueHandle;
use crate::queue_set::{QueueSetHandle, SetMember};

/// Task body: runs one slice with the task's parameter block
pub type TaskFn = fn(&mut crate::kernel::Kernel, &mut [u8]);

/// Task priority (higher number = more eligible)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskPriority(pub u8);

impl TaskPriority {
    /// Reserved for the idle task; user tasks may share it
    pub const IDLE: TaskPriority = TaskPriority(0);
    /// Background work
    pub const LOW: TaskPriority = TaskPriority(1);
    /// Ordinary application tasks
    pub const NORMAL: TaskPriority = TaskPriority(2);
    /// Latency-sensitive tasks
    pub const HIGH: TaskPriority = TaskPriority(3);
    /// Most eligible level
    pub const MAX: TaskPriority = TaskPriority((MAX_PRIORITIES - 1) as u8);

    /// Clamp to the configured number of levels
    pub fn clamped(self) -> Self {
        if self > Self::MAX {
            Self::MAX
        } else {
            self
        }
    }

    pub(crate) fn level(self) -> usize {
        self.0 as usize
    }
}

/// Stable task identity
///
/// Carries the generation of its table slot; a handle kept past deletion is
/// rejected with `InvalidTask`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId {
    pub(crate) index: u8,
    pub(crate) generation: u16,
}

impl TaskId {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible to run
    Ready,
    /// Holds the Running slot
    Running,
    /// Waiting for a timeout or an event
    Blocked,
    /// Removed from scheduling until resumed
    Suspended,
    /// Deleted, or slot never used
    Terminated,
}

/// What a Blocked task is waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    None,
    /// Pure `delay`
    Delay,
    /// Space in a full queue; the pending item sits in the task's transfer buffer
    Send { queue: QueueHandle, to_front: bool },
    /// An item, token or mutex
    Receive(QueueHandle),
    /// Any member of a queue set
    Select(QueueSetHandle),
}

/// Successful result of a wait, collected by the woken task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Delay elapsed
    Delayed,
    /// Pending item admitted to the queue
    Sent,
    /// Item delivered into the transfer buffer
    Received,
    /// Semaphore token or mutex obtained
    Acquired,
    /// A queue set member became ready
    Selected(SetMember),
}

/// Static task descriptor
#[derive(Clone)]
pub struct Task {
    /// Task name (8 ASCII chars max)
    pub name: [u8; 8],
    /// Task body
    pub func: Option<TaskFn>,
    /// Assigned priority
    pub base_priority: TaskPriority,
    /// Effective priority, raised above `base_priority` by mutex inheritance
    pub priority: TaskPriority,
    /// Current state
    pub state: TaskState,
    /// Slots reuse bumps this to invalidate old handles
    pub(crate) generation: u16,
    /// Stack budget carved from the kernel heap
    pub(crate) stack: Region,
    /// Parameter block handed to the body on every slice
    pub(crate) params: Vec<u8, PARAM_BYTES>,
    pub(crate) wait: Wait,
    /// Result of the last wait, until collected
    pub(crate) outcome: Option<Result<Completion, Error>>,
    /// Pending send item or delivered receive item
    pub(crate) transfer: Vec<u8, MAX_ITEM_SIZE>,
    /// Mutexes currently held (for disinheritance)
    pub(crate) mutexes_held: u8,
    /// Slices executed (task profiler)
    pub run_count: u32,
}

impl Task {
    /// Empty task slot
    pub const fn empty() -> Self {
        Self {
            name: [0u8; 8],
            func: None,
            base_priority: TaskPriority::IDLE,
            priority: TaskPriority::IDLE,
            state: TaskState::Terminated,
            generation: 0,
            stack: Region::EMPTY,
            params: Vec::new(),
            wait: Wait::None,
            outcome: None,
            transfer: Vec::new(),
            mutexes_held: 0,
            run_count: 0,
        }
    }

    /// Create a task descriptor in the Ready state
    pub fn new(name: &[u8], func: TaskFn, priority: TaskPriority) -> Self {
        let mut n = [0u8; 8];
        let len = name.len().min(8);
        n[..len].copy_from_slice(&name[..len]);

        let priority = priority.clamped();
        Self {
            name: n,
            func: Some(func),
            base_priority: priority,
            priority,
            state: TaskState::Ready,
            ..Self::empty()
        }
    }

    /// Is this task slot in use?
    pub fn is_active(&self) -> bool {
        self.state != TaskState::Terminated
    }

    /// Name without padding
    pub fn name(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        &self.name[..len]
    }

    /// Parameter block as the body last left it
    pub fn params(&self) -> &[u8] {
        &self.params
    }

    /// Stack budget in bytes
    pub fn stack_size(&self) -> usize {
        self.stack.len
    }

    /// Is the effective priority raised by inheritance?
    pub fn is_inheriting(&self) -> bool {
        self.priority != self.base_priority
    }

    pub(crate) fn id(&self, index: usize) -> TaskId {
        TaskId {
            index: index as u8,
            generation: self.generation,
        }
    }
}
