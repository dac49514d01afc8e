//! Kernel error taxonomy
//!
//! Every primitive hands its outcome back to the caller. `Full`, `Empty`,
//! `AlreadyFull` and `Timeout` are usually ordinary control flow; the caller
//! decides whether they are failures.

use core::fmt;

/// Kernel operation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Non-blocking send declined: queue full
    Full,
    /// Non-blocking receive/take declined: nothing available
    Empty,
    /// Semaphore already at its maximum count
    AlreadyFull,
    /// Blocking wait elapsed without success
    Timeout,
    /// Deleted or unknown task handle
    InvalidTask,
    /// Deleted or unknown queue, semaphore, mutex or queue set handle
    InvalidQueue,
    /// Creation-time resource exhaustion
    AllocationFailed,
    /// Member already belongs to a queue set
    AlreadyInSet,
    /// Member still holds buffered items
    NotEmpty,
    /// Mutex released by a task that does not hold it
    NotOwner,
    /// Item buffer shorter than the queue's item size
    InvalidItem,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::Full => "queue full",
            Error::Empty => "queue empty",
            Error::AlreadyFull => "semaphore already at maximum count",
            Error::Timeout => "wait timed out",
            Error::InvalidTask => "invalid task handle",
            Error::InvalidQueue => "invalid queue handle",
            Error::AllocationFailed => "allocation failed",
            Error::AlreadyInSet => "member already in a queue set",
            Error::NotEmpty => "member not empty",
            Error::NotOwner => "mutex not held by caller",
            Error::InvalidItem => "item buffer smaller than item size",
        };
        f.write_str(msg)
    }
}
