//! Queue sets — block on "any of N" queues or semaphores
//!
//! Each item that lands in a member's buffer posts exactly one notification
//! naming that member. `select` hands out notifications first-come
//! first-served; it does not consume the member's data, the caller receives
//! from the reported member afterwards.

use core::task::Poll;

use heapless::Deque;
use log::{debug, warn};

use crate::config::MAX_SET_SLOTS;
use crate::error::Error;
use crate::handle::Slot;
use crate::kernel::{Context, Kernel};
use crate::queue::QueueHandle;
use crate::semaphore::SemaphoreHandle;
use crate::task::{Completion, Wait};
use crate::waiters::WaitList;

/// Queue set handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueueSetHandle(pub(crate) Slot);

impl QueueSetHandle {
    pub fn to_bytes(self) -> [u8; 4] {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(Slot::from_bytes(bytes))
    }
}

/// A queue or semaphore that can belong to a set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetMember {
    Queue(QueueHandle),
    Semaphore(SemaphoreHandle),
}

impl SetMember {
    pub(crate) fn queue(self) -> QueueHandle {
        match self {
            SetMember::Queue(q) => q,
            SetMember::Semaphore(s) => s.0,
        }
    }
}

impl From<QueueHandle> for SetMember {
    fn from(q: QueueHandle) -> Self {
        SetMember::Queue(q)
    }
}

impl From<SemaphoreHandle> for SetMember {
    fn from(s: SemaphoreHandle) -> Self {
        SetMember::Semaphore(s)
    }
}

pub struct QueueSet {
    /// Notification slots
    capacity: usize,
    /// Sum of member capacities
    reserved: usize,
    /// Pending notifications, oldest first
    ready: Deque<SetMember, MAX_SET_SLOTS>,
    pub(crate) waiters: WaitList,
}

impl QueueSet {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            reserved: 0,
            ready: Deque::new(),
            waiters: WaitList::new(),
        }
    }

    /// Pending notifications
    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }
}

impl Kernel {
    /// Create a set able to track `total_slots` buffered items across its members
    pub fn queue_set_create(&mut self, total_slots: usize) -> Result<QueueSetHandle, Error> {
        if total_slots == 0 || total_slots > MAX_SET_SLOTS {
            return Err(Error::AllocationFailed);
        }
        let slot = self.sets.insert(QueueSet::new(total_slots))?;
        debug!("queue set {} created with {} slots", slot.index(), total_slots);
        Ok(QueueSetHandle(slot))
    }

    /// Add an empty queue or semaphore to a set
    ///
    /// Fails with `AlreadyInSet` if it already belongs to a set, `NotEmpty` if
    /// it holds items, and `Full` if the set has no notification room for
    /// the member's capacity.
    pub fn queue_set_add(&mut self, set: QueueSetHandle, member: impl Into<SetMember>) -> Result<(), Error> {
        let handle = member.into().queue();
        let s = self.sets.get_mut(set.0).ok_or(Error::InvalidQueue)?;
        let q = self.queues.get_mut(handle.0).ok_or(Error::InvalidQueue)?;
        if q.set.is_some() {
            return Err(Error::AlreadyInSet);
        }
        if !q.is_empty() {
            return Err(Error::NotEmpty);
        }
        if s.reserved + q.capacity() > s.capacity {
            return Err(Error::Full);
        }
        s.reserved += q.capacity();
        q.set = Some(set);
        Ok(())
    }

    /// Remove an empty member from its set
    pub fn queue_set_remove(&mut self, set: QueueSetHandle, member: impl Into<SetMember>) -> Result<(), Error> {
        let handle = member.into().queue();
        self.sets.get(set.0).ok_or(Error::InvalidQueue)?;
        let q = self.queues.get_mut(handle.0).ok_or(Error::InvalidQueue)?;
        if q.set != Some(set) {
            return Err(Error::InvalidQueue);
        }
        if !q.is_empty() {
            return Err(Error::NotEmpty);
        }
        q.set = None;
        let capacity = q.capacity();
        self.unlink_member(set, handle, capacity);
        Ok(())
    }

    /// Wait up to `wait_ticks` for any member to receive an item
    ///
    /// Returns the member to receive from. On `Ok(Poll::Pending)` the member
    /// arrives later as `Completion::Selected`.
    pub fn queue_set_select(&mut self, set: QueueSetHandle, wait_ticks: u32) -> Result<Poll<SetMember>, Error> {
        self.select_inner(set, wait_ticks, Context::Task)
    }

    /// Delete a set; members become free to join another set
    pub fn queue_set_delete(&mut self, set: QueueSetHandle) -> Result<(), Error> {
        let s = self.sets.remove(set.0).ok_or(Error::InvalidQueue)?;
        for q in self.queues.iter_mut() {
            if q.set == Some(set) {
                q.set = None;
            }
        }
        let mut higher = false;
        for id in s.waiters.tasks() {
            higher |= self.scheduler.unblock(id, Err(Error::InvalidQueue));
        }
        self.scheduler.request_switch(higher, false);
        Ok(())
    }

    /// Pending notifications of a set
    pub fn queue_set_pending(&self, set: QueueSetHandle) -> Result<usize, Error> {
        self.sets.get(set.0).map(QueueSet::len).ok_or(Error::InvalidQueue)
    }

    pub(crate) fn select_inner(
        &mut self,
        set: QueueSetHandle,
        wait_ticks: u32,
        ctx: Context,
    ) -> Result<Poll<SetMember>, Error> {
        let s = self.sets.get_mut(set.0).ok_or(Error::InvalidQueue)?;
        if let Some(member) = s.ready.pop_front() {
            return Ok(Poll::Ready(member));
        }
        if wait_ticks == 0 || ctx == Context::Isr || !self.scheduler.can_block() {
            return Err(Error::Empty);
        }
        let cur = self.scheduler.current();
        let priority = self.scheduler.current_task_mut().priority;
        s.waiters.insert(cur, priority);
        self.scheduler.block_current(Wait::Select(set), wait_ticks);
        Ok(Poll::Pending)
    }

    /// A member buffered an item: wake one selector, or queue the notification
    pub(crate) fn notify_set(&mut self, set: QueueSetHandle, member: SetMember, from_isr: bool) {
        let Some(s) = self.sets.get_mut(set.0) else {
            return;
        };
        match s.waiters.pop_highest() {
            Some(id) => {
                let higher = self.scheduler.unblock(id, Ok(Completion::Selected(member)));
                self.scheduler.request_switch(higher, from_isr);
            }
            None => {
                // Only reachable when members are read without selecting first.
                if s.ready.len() >= s.capacity || s.ready.push_back(member).is_err() {
                    warn!("queue set {} full, notification dropped", set.0.index());
                }
            }
        }
    }

    /// Drop pending notifications naming `queue`
    pub(crate) fn purge_notifications(&mut self, set: QueueSetHandle, queue: QueueHandle) {
        let Some(s) = self.sets.get_mut(set.0) else {
            return;
        };
        for _ in 0..s.ready.len() {
            if let Some(m) = s.ready.pop_front() {
                if m.queue() != queue {
                    let _ = s.ready.push_back(m);
                }
            }
        }
    }

    pub(crate) fn unlink_member(&mut self, set: QueueSetHandle, queue: QueueHandle, capacity: usize) {
        self.purge_notifications(set, queue);
        if let Some(s) = self.sets.get_mut(set.0) {
            s.reserved = s.reserved.saturating_sub(capacity);
        }
    }
}
