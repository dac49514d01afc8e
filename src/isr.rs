//! Interrupt-context API
//!
//! An interrupt handler gets an [`IsrContext`] instead of the kernel itself,
//! so only the non-blocking operations are reachable. A wake-up that outranks
//! the interrupted task does not switch immediately; it is recorded and
//! reported back so the handler can request the switch on exit.

use log::trace;

use crate::error::Error;
use crate::kernel::{Context, Kernel};
use crate::queue::QueueHandle;
use crate::queue_set::{QueueSetHandle, SetMember};
use crate::semaphore::SemaphoreHandle;

/// Non-blocking view of the kernel for interrupt handlers
pub struct IsrContext<'k> {
    kernel: &'k mut Kernel,
}

impl<'k> IsrContext<'k> {
    /// Send to the back of a queue; `Full` instead of blocking
    pub fn queue_send(&mut self, queue: QueueHandle, item: &[u8]) -> Result<(), Error> {
        self.kernel.send_inner(queue, item, 0, false, Context::Isr).map(|_| ())
    }

    pub fn queue_send_to_front(&mut self, queue: QueueHandle, item: &[u8]) -> Result<(), Error> {
        self.kernel.send_inner(queue, item, 0, true, Context::Isr).map(|_| ())
    }

    /// Receive into `out`; `Empty` instead of blocking
    pub fn queue_receive(&mut self, queue: QueueHandle, out: &mut [u8]) -> Result<(), Error> {
        self.kernel.receive_inner(queue, out, 0, Context::Isr).map(|_| ())
    }

    pub fn messages_waiting(&self, queue: QueueHandle) -> Result<usize, Error> {
        self.kernel.messages_waiting(queue)
    }

    pub fn semaphore_give(&mut self, sem: SemaphoreHandle) -> Result<(), Error> {
        self.kernel.give_inner(sem, Context::Isr)
    }

    pub fn semaphore_take(&mut self, sem: SemaphoreHandle) -> Result<(), Error> {
        self.kernel.receive_inner(sem.0, &mut [], 0, Context::Isr).map(|_| ())
    }

    /// Pending member of a set, or `Empty`
    pub fn queue_set_select(&mut self, set: QueueSetHandle) -> Result<SetMember, Error> {
        match self.kernel.select_inner(set, 0, Context::Isr)? {
            core::task::Poll::Ready(member) => Ok(member),
            core::task::Poll::Pending => Err(Error::Empty),
        }
    }
}

impl Kernel {
    /// Run `f` as an interrupt handler
    ///
    /// Returns its result and whether a task that outranks the interrupted
    /// one was woken. Pass the flag to [`Kernel::yield_from_isr`] to switch
    /// now; otherwise the switch happens at the next tick or `step`.
    pub fn isr<R>(&mut self, f: impl FnOnce(&mut IsrContext<'_>) -> R) -> (R, bool) {
        let mut ctx = IsrContext { kernel: self };
        let result = f(&mut ctx);
        let switch_required = self.scheduler.is_yield_pending();
        if switch_required {
            trace!("isr woke a higher priority task");
        }
        (result, switch_required)
    }
}
