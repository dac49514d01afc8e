//! prio-rtos — preemptive priority RTOS core
//!
//! Small kernel for deeply embedded targets:
//! - Fixed-priority preemptive scheduling, optional time slicing among equals
//! - Blocking queues of fixed-size items with timeouts
//! - Binary/counting semaphores, mutexes with priority inheritance
//! - Queue sets to block on several queues at once
//! - Static tables and a byte pool; no global allocator
//!
//! Objects are named by generation-checked handles, so using a handle after
//! its object was deleted is reported instead of aliasing a new object.

#![no_std]

pub mod config;
pub mod error;
pub mod handle;
pub mod heap;
pub mod task;
pub mod ready;
pub mod delay;
pub mod waiters;
pub mod timer;
pub mod scheduler;
pub mod queue;
pub mod semaphore;
pub mod queue_set;
pub mod kernel;
pub mod isr;
pub mod shared;

pub use config::{KernelConfig, WAIT_FOREVER};
pub use error::Error;
pub use isr::IsrContext;
pub use kernel::{Kernel, KernelStats};
pub use queue::QueueHandle;
pub use queue_set::{QueueSetHandle, SetMember};
pub use scheduler::Scheduler;
pub use semaphore::{MutexHandle, SemaphoreHandle};
pub use shared::SharedKernel;
pub use task::{Completion, TaskFn, TaskId, TaskPriority, TaskState};
