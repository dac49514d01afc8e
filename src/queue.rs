//! Blocking FIFO queue of fixed-size items
//!
//! Storage is a ring of `capacity * item_size` bytes carved from the kernel
//! heap. Semaphores and mutexes reuse the same record with zero-sized items,
//! so every primitive shares one blocking path.
//!
//! Blocked tasks are served by direct hand-off: a sender waiting on a full
//! queue is admitted the moment a slot frees (its item goes in on its
//! behalf), and a receiver waiting on an empty queue gets the next item
//! without it ever touching the ring. The task woken is always the most
//! eligible waiter, earliest first among equals.

use core::task::Poll;

use log::{debug, warn};

use crate::config::MAX_ITEM_SIZE;
use crate::error::Error;
use crate::handle::Slot;
use crate::heap::{Heap, Region};
use crate::kernel::{Context, Kernel};
use crate::queue_set::{QueueSetHandle, SetMember};
use crate::semaphore::SemaphoreHandle;
use crate::task::{Completion, TaskId, Wait};
use crate::waiters::WaitList;

/// Queue handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueHandle(pub(crate) Slot);

impl QueueHandle {
    /// Pack into 4 bytes, e.g. to pass through a task parameter block
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(Slot::from_bytes(bytes))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueueKind {
    Queue,
    Semaphore,
    Mutex,
    RecursiveMutex,
}

/// Queue record
pub struct Queue {
    pub(crate) kind: QueueKind,
    capacity: usize,
    item_size: usize,
    storage: Region,
    /// Slot of the oldest item
    head: usize,
    count: usize,
    pub(crate) senders: WaitList,
    pub(crate) receivers: WaitList,
    pub(crate) set: Option<QueueSetHandle>,
    /// Mutex holder
    pub(crate) holder: Option<TaskId>,
    /// Recursive mutex depth
    pub(crate) recursion: u32,
}

impl Queue {
    pub(crate) fn new(kind: QueueKind, capacity: usize, item_size: usize, storage: Region) -> Self {
        Self {
            kind,
            capacity,
            item_size,
            storage,
            head: 0,
            count: 0,
            senders: WaitList::new(),
            receivers: WaitList::new(),
            set: None,
            holder: None,
            recursion: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    pub(crate) fn is_mutex(&self) -> bool {
        matches!(self.kind, QueueKind::Mutex | QueueKind::RecursiveMutex)
    }

    pub(crate) fn set_count(&mut self, count: usize) {
        self.count = count.min(self.capacity);
    }

    /// Identity reported by a queue set
    pub(crate) fn member(&self, handle: QueueHandle) -> SetMember {
        match self.kind {
            QueueKind::Semaphore => SetMember::Semaphore(SemaphoreHandle(handle)),
            _ => SetMember::Queue(handle),
        }
    }

    /// Copy `item` into the ring; caller guarantees `!is_full()`
    pub(crate) fn push(&mut self, heap: &mut Heap, item: &[u8], to_front: bool) {
        if self.item_size > 0 {
            let slot = if to_front {
                self.head = (self.head + self.capacity - 1) % self.capacity;
                self.head
            } else {
                (self.head + self.count) % self.capacity
            };
            let at = slot * self.item_size;
            heap.slice_mut(self.storage)[at..at + self.item_size]
                .copy_from_slice(&item[..self.item_size]);
        }
        self.count += 1;
    }

    /// Copy the oldest item into `out` without removing it; caller guarantees `!is_empty()`
    pub(crate) fn peek(&self, heap: &Heap, out: &mut [u8]) {
        if self.item_size > 0 {
            let at = self.head * self.item_size;
            out[..self.item_size].copy_from_slice(&heap.slice(self.storage)[at..at + self.item_size]);
        }
    }

    /// Move the oldest item into `out`; caller guarantees `!is_empty()`
    pub(crate) fn pop(&mut self, heap: &Heap, out: &mut [u8]) {
        self.peek(heap, out);
        if self.item_size > 0 {
            self.head = (self.head + 1) % self.capacity;
        }
        self.count -= 1;
    }

    fn clear(&mut self) {
        self.head = 0;
        self.count = 0;
    }
}

impl Kernel {
    /// Create a queue of `capacity` items of `item_size` bytes each
    pub fn queue_create(&mut self, capacity: usize, item_size: usize) -> Result<QueueHandle, Error> {
        if capacity == 0 || item_size == 0 || item_size > MAX_ITEM_SIZE {
            warn!("queue {}x{} rejected", capacity, item_size);
            return Err(Error::AllocationFailed);
        }
        let bytes = capacity.checked_mul(item_size).ok_or(Error::AllocationFailed)?;
        let handle = self.create_queue_record(QueueKind::Queue, capacity, item_size, bytes)?;
        debug!("queue {} created: {} x {} bytes", handle.0.index(), capacity, item_size);
        Ok(handle)
    }

    pub(crate) fn create_queue_record(
        &mut self,
        kind: QueueKind,
        capacity: usize,
        item_size: usize,
        bytes: usize,
    ) -> Result<QueueHandle, Error> {
        let storage = self.heap.alloc(bytes).map_err(|e| {
            warn!("queue storage of {} bytes unavailable", bytes);
            e
        })?;
        match self.queues.insert(Queue::new(kind, capacity, item_size, storage)) {
            Ok(slot) => Ok(QueueHandle(slot)),
            Err(e) => {
                self.heap.free(storage);
                warn!("queue table full");
                Err(e)
            }
        }
    }

    /// Send to the back of the queue, blocking up to `wait_ticks` while full
    ///
    /// `Ok(Poll::Pending)` means the caller is now Blocked; its result arrives
    /// through [`Kernel::wait_result`] as `Sent` or `Timeout`.
    pub fn queue_send(&mut self, queue: QueueHandle, item: &[u8], wait_ticks: u32) -> Result<Poll<()>, Error> {
        self.send_inner(queue, item, wait_ticks, false, Context::Task)
    }

    /// Send to the front of the queue (delivered before everything buffered)
    pub fn queue_send_to_front(
        &mut self,
        queue: QueueHandle,
        item: &[u8],
        wait_ticks: u32,
    ) -> Result<Poll<()>, Error> {
        self.send_inner(queue, item, wait_ticks, true, Context::Task)
    }

    /// Receive the oldest item into `out`, blocking up to `wait_ticks` while empty
    ///
    /// On `Ok(Poll::Pending)` the item is copied out later by
    /// [`Kernel::wait_result`].
    pub fn queue_receive(&mut self, queue: QueueHandle, out: &mut [u8], wait_ticks: u32) -> Result<Poll<()>, Error> {
        self.receive_inner(queue, out, wait_ticks, Context::Task)
    }

    /// Copy the oldest item without removing it; never blocks
    pub fn queue_peek(&self, queue: QueueHandle, out: &mut [u8]) -> Result<(), Error> {
        let q = self.queues.get(queue.0).ok_or(Error::InvalidQueue)?;
        if out.len() < q.item_size {
            return Err(Error::InvalidItem);
        }
        if q.is_empty() {
            return Err(Error::Empty);
        }
        q.peek(&self.heap, out);
        Ok(())
    }

    /// Items currently buffered
    pub fn messages_waiting(&self, queue: QueueHandle) -> Result<usize, Error> {
        self.queues.get(queue.0).map(Queue::len).ok_or(Error::InvalidQueue)
    }

    /// Free slots
    pub fn spaces_available(&self, queue: QueueHandle) -> Result<usize, Error> {
        self.queues
            .get(queue.0)
            .map(|q| q.capacity - q.count)
            .ok_or(Error::InvalidQueue)
    }

    /// Discard every buffered item; one blocked sender is admitted
    pub fn queue_reset(&mut self, queue: QueueHandle) -> Result<(), Error> {
        let q = self.queues.get_mut(queue.0).ok_or(Error::InvalidQueue)?;
        if q.is_mutex() {
            return Err(Error::InvalidQueue);
        }
        q.clear();
        if let Some(set) = q.set {
            self.purge_notifications(set, queue);
        }
        self.admit_sender(queue, false);
        Ok(())
    }

    /// Delete a queue and release its storage
    ///
    /// Callers must not delete a queue that still has waiters; any left are
    /// woken with `InvalidQueue`.
    pub fn queue_delete(&mut self, queue: QueueHandle) -> Result<(), Error> {
        let q = self.queues.remove(queue.0).ok_or(Error::InvalidQueue)?;
        self.heap.free(q.storage);
        if let Some(set) = q.set {
            self.unlink_member(set, queue, q.capacity);
        }
        if let Some(holder) = q.holder {
            if let Ok(task) = self.scheduler.task_mut(holder) {
                task.mutexes_held = task.mutexes_held.saturating_sub(1);
            }
        }
        let mut higher = false;
        for id in q.senders.tasks().chain(q.receivers.tasks()) {
            higher |= self.scheduler.unblock(id, Err(Error::InvalidQueue));
        }
        debug!("queue {} deleted", queue.0.index());
        self.scheduler.request_switch(higher, false);
        Ok(())
    }

    pub(crate) fn send_inner(
        &mut self,
        handle: QueueHandle,
        item: &[u8],
        wait_ticks: u32,
        to_front: bool,
        ctx: Context,
    ) -> Result<Poll<()>, Error> {
        let queue = self.queues.get_mut(handle.0).ok_or(Error::InvalidQueue)?;
        let size = queue.item_size;
        if item.len() < size {
            return Err(Error::InvalidItem);
        }
        if !queue.is_full() {
            self.deliver(handle, &item[..size], to_front, ctx);
            return Ok(Poll::Ready(()));
        }
        if wait_ticks == 0 || ctx == Context::Isr || !self.scheduler.can_block() {
            return Err(Error::Full);
        }

        let cur = self.scheduler.current();
        let task = self.scheduler.current_task_mut();
        task.transfer.clear();
        let _ = task.transfer.extend_from_slice(&item[..size]);
        queue.senders.insert(cur, task.priority);
        self.scheduler.block_current(Wait::Send { queue: handle, to_front }, wait_ticks);
        Ok(Poll::Pending)
    }

    pub(crate) fn receive_inner(
        &mut self,
        handle: QueueHandle,
        out: &mut [u8],
        wait_ticks: u32,
        ctx: Context,
    ) -> Result<Poll<()>, Error> {
        let queue = self.queues.get_mut(handle.0).ok_or(Error::InvalidQueue)?;
        if out.len() < queue.item_size {
            return Err(Error::InvalidItem);
        }
        if !queue.is_empty() {
            queue.pop(&self.heap, out);
            self.admit_sender(handle, ctx == Context::Isr);
            return Ok(Poll::Ready(()));
        }
        if wait_ticks == 0 || ctx == Context::Isr || !self.scheduler.can_block() {
            return Err(Error::Empty);
        }

        let cur = self.scheduler.current();
        let priority = self.scheduler.current_task_mut().priority;
        queue.receivers.insert(cur, priority);
        self.scheduler.block_current(Wait::Receive(handle), wait_ticks);
        Ok(Poll::Pending)
    }

    /// Place an item in a queue that has room
    ///
    /// A waiting receiver takes it directly; otherwise it is buffered and the
    /// owning queue set, if any, is notified.
    pub(crate) fn deliver(&mut self, handle: QueueHandle, item: &[u8], to_front: bool, ctx: Context) {
        let Some(queue) = self.queues.get_mut(handle.0) else {
            return;
        };
        let from_isr = ctx == Context::Isr;

        if let Some(rx) = queue.receivers.pop_highest() {
            let completion = if queue.item_size == 0 {
                Completion::Acquired
            } else {
                Completion::Received
            };
            if let Ok(task) = self.scheduler.task_mut(rx) {
                task.transfer.clear();
                let _ = task.transfer.extend_from_slice(item);
            }
            let higher = self.scheduler.unblock(rx, Ok(completion));
            self.scheduler.request_switch(higher, from_isr);
            return;
        }

        queue.push(&mut self.heap, item, to_front);
        if let Some(set) = queue.set {
            let member = queue.member(handle);
            self.notify_set(set, member, from_isr);
        }
    }

    /// A slot just freed: admit the most eligible blocked sender
    pub(crate) fn admit_sender(&mut self, handle: QueueHandle, from_isr: bool) {
        let Some(queue) = self.queues.get_mut(handle.0) else {
            return;
        };
        let Some(tx) = queue.senders.pop_highest() else {
            return;
        };
        let Ok(task) = self.scheduler.task_mut(tx) else {
            return;
        };
        let to_front = matches!(task.wait, Wait::Send { to_front: true, .. });
        queue.push(&mut self.heap, &task.transfer, to_front);
        task.transfer.clear();

        if let Some(set) = queue.set {
            let member = queue.member(handle);
            self.notify_set(set, member, from_isr);
        }
        let higher = self.scheduler.unblock(tx, Ok(Completion::Sent));
        self.scheduler.request_switch(higher, from_isr);
    }
}
