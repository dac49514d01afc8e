//! Semaphores and mutexes — zero-size-item queues
//!
//! A semaphore's count is the queue's item count and its maximum is the
//! queue's capacity. `give` never blocks, so it is also offered to interrupt
//! handlers. A mutex additionally records its holder and lends the holder the
//! priority of the most eligible task waiting for it (priority inheritance),
//! returning it on release.

use core::task::Poll;

use log::{debug, trace};

use crate::error::Error;
use crate::kernel::{Context, Kernel};
use crate::queue::{QueueHandle, QueueKind};
use crate::task::{Completion, TaskPriority, Wait};

/// Binary or counting semaphore handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemaphoreHandle(pub(crate) QueueHandle);

/// Mutex handle (plain or recursive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutexHandle(pub(crate) QueueHandle);

impl Kernel {
    /// Binary semaphore, created empty
    pub fn semaphore_create_binary(&mut self) -> Result<SemaphoreHandle, Error> {
        self.semaphore_create_counting(1, 0)
    }

    /// Counting semaphore holding `initial` of at most `max` tokens
    pub fn semaphore_create_counting(&mut self, max: usize, initial: usize) -> Result<SemaphoreHandle, Error> {
        if max == 0 || initial > max {
            return Err(Error::AllocationFailed);
        }
        let handle = self.create_queue_record(QueueKind::Semaphore, max, 0, 0)?;
        if let Some(q) = self.queues.get_mut(handle.0) {
            q.set_count(initial);
        }
        debug!("semaphore {} created ({}/{})", handle.0.index(), initial, max);
        Ok(SemaphoreHandle(handle))
    }

    /// Add a token; `AlreadyFull` at the maximum count
    pub fn semaphore_give(&mut self, sem: SemaphoreHandle) -> Result<(), Error> {
        self.give_inner(sem, Context::Task)
    }

    /// Take a token, blocking up to `wait_ticks` while none is available
    pub fn semaphore_take(&mut self, sem: SemaphoreHandle, wait_ticks: u32) -> Result<Poll<()>, Error> {
        self.receive_inner(sem.0, &mut [], wait_ticks, Context::Task)
    }

    /// Tokens currently available
    pub fn semaphore_count(&self, sem: SemaphoreHandle) -> Result<usize, Error> {
        self.messages_waiting(sem.0)
    }

    pub fn semaphore_delete(&mut self, sem: SemaphoreHandle) -> Result<(), Error> {
        self.queue_delete(sem.0)
    }

    pub(crate) fn give_inner(&mut self, sem: SemaphoreHandle, ctx: Context) -> Result<(), Error> {
        let q = self.queues.get(sem.0 .0).ok_or(Error::InvalidQueue)?;
        if q.kind != QueueKind::Semaphore {
            return Err(Error::InvalidQueue);
        }
        if q.is_full() {
            return Err(Error::AlreadyFull);
        }
        self.deliver(sem.0, &[], false, ctx);
        Ok(())
    }

    /// Mutex, created available
    pub fn mutex_create(&mut self) -> Result<MutexHandle, Error> {
        self.create_mutex(QueueKind::Mutex)
    }

    /// Mutex the holder may take repeatedly; released when every take is given back
    pub fn mutex_create_recursive(&mut self) -> Result<MutexHandle, Error> {
        self.create_mutex(QueueKind::RecursiveMutex)
    }

    fn create_mutex(&mut self, kind: QueueKind) -> Result<MutexHandle, Error> {
        let handle = self.create_queue_record(kind, 1, 0, 0)?;
        if let Some(q) = self.queues.get_mut(handle.0) {
            q.set_count(1);
        }
        debug!("mutex {} created", handle.0.index());
        Ok(MutexHandle(handle))
    }

    /// Take the mutex, blocking up to `wait_ticks`
    ///
    /// While the caller waits, the holder runs at the caller's priority if
    /// that is higher than its own. The idle task cannot hold a mutex, so a
    /// take before `start` (or from idle) is rejected with `InvalidTask`.
    pub fn mutex_take(&mut self, mutex: MutexHandle, wait_ticks: u32) -> Result<Poll<()>, Error> {
        if self.scheduler.is_idle_running() {
            return Err(Error::InvalidTask);
        }
        let cur = self.scheduler.current();
        let q = self.queues.get_mut(mutex.0 .0).ok_or(Error::InvalidQueue)?;
        if !q.is_mutex() {
            return Err(Error::InvalidQueue);
        }

        if q.holder == Some(cur) && q.kind == QueueKind::RecursiveMutex {
            q.recursion += 1;
            return Ok(Poll::Ready(()));
        }
        if !q.is_empty() {
            q.set_count(0);
            q.holder = Some(cur);
            q.recursion = 1;
            self.scheduler.current_task_mut().mutexes_held += 1;
            return Ok(Poll::Ready(()));
        }
        if wait_ticks == 0 || !self.scheduler.can_block() {
            return Err(Error::Empty);
        }

        let priority = self.scheduler.current_task_mut().priority;
        q.receivers.insert(cur, priority);
        let holder = q.holder;
        if let Some(holder) = holder {
            if let Ok(task) = self.scheduler.task(holder) {
                if task.priority < priority {
                    trace!("task {} inherits priority {}", holder.index(), priority.0);
                    self.reprioritize(holder, priority);
                }
            }
        }
        self.scheduler.block_current(Wait::Receive(mutex.0), wait_ticks);
        Ok(Poll::Pending)
    }

    /// Release the mutex
    ///
    /// Only the holder may give. The holder's inherited priority is dropped
    /// once it holds no other mutex, and the most eligible waiter becomes the
    /// new holder.
    pub fn mutex_give(&mut self, mutex: MutexHandle) -> Result<(), Error> {
        let cur = self.scheduler.current();
        let q = self.queues.get_mut(mutex.0 .0).ok_or(Error::InvalidQueue)?;
        if !q.is_mutex() {
            return Err(Error::InvalidQueue);
        }
        if q.holder != Some(cur) {
            return Err(Error::NotOwner);
        }
        if q.recursion > 1 {
            q.recursion -= 1;
            return Ok(());
        }

        let next = q.receivers.pop_highest();
        let inherit = q.receivers.highest_priority();
        q.holder = next;
        q.recursion = if next.is_some() { 1 } else { 0 };
        if next.is_none() {
            q.set_count(1);
        }

        // Restore and hand over first, then make a single scheduling decision
        // so no task runs between the two.
        let task = self.scheduler.current_task_mut();
        task.mutexes_held = task.mutexes_held.saturating_sub(1);
        let restore = (task.mutexes_held == 0 && task.is_inheriting()).then_some(task.base_priority);
        if let Some(base) = restore {
            trace!("task {} disinherits to {}", cur.index(), base.0);
            self.retune(cur, base);
        }

        if let Some(next) = next {
            if let Ok(task) = self.scheduler.task_mut(next) {
                task.mutexes_held += 1;
                let own = task.priority;
                if let Some(p) = inherit.filter(|p| *p > own) {
                    self.retune(next, p);
                }
            }
            self.scheduler.unblock(next, Ok(Completion::Acquired));
        }
        self.scheduler.reschedule(restore.is_some());
        Ok(())
    }

    /// Current holder, if taken
    pub fn mutex_holder(&self, mutex: MutexHandle) -> Result<Option<crate::task::TaskId>, Error> {
        let q = self.queues.get(mutex.0 .0).ok_or(Error::InvalidQueue)?;
        Ok(q.holder)
    }

    pub fn mutex_delete(&mut self, mutex: MutexHandle) -> Result<(), Error> {
        self.queue_delete(mutex.0)
    }

    /// A waiter left a mutex without acquiring it: lower the holder to the
    /// best remaining waiter or its own base priority
    ///
    /// Skipped while the holder holds other mutexes, whose waiters may still
    /// justify the boost.
    pub(crate) fn disinherit_after_timeout(&mut self, mutex: QueueHandle) {
        let Some(q) = self.queues.get(mutex.0) else {
            return;
        };
        let Some(holder) = q.holder else {
            return;
        };
        let waiting = q.receivers.highest_priority().unwrap_or(TaskPriority::IDLE);
        let Ok(task) = self.scheduler.task(holder) else {
            return;
        };
        if task.mutexes_held != 1 {
            return;
        }
        let target = task.base_priority.max(waiting);
        if target != task.priority {
            trace!("task {} drops to priority {}", holder.index(), target.0);
            self.reprioritize(holder, target);
        }
    }
}
