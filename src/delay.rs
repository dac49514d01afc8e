//! Delay/Block list — tasks with a wake tick, sorted ascending
//!
//! Holds both pure delays and blocking calls with a finite timeout. Equal wake
//! ticks keep insertion order. A task leaves the list exactly once: by expiry
//! here, or by the kernel removing it when its event arrives.

use heapless::Vec;

use crate::config::MAX_TASKS;
use crate::task::TaskId;
use crate::timer::Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayEntry {
    pub task: TaskId,
    pub wake_tick: Tick,
}

pub struct DelayList {
    entries: Vec<DelayEntry, MAX_TASKS>,
}

impl DelayList {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn insert(&mut self, task: TaskId, wake_tick: Tick) {
        let at = self
            .entries
            .iter()
            .position(|e| e.wake_tick > wake_tick)
            .unwrap_or(self.entries.len());
        // Bounded by MAX_TASKS: a task is listed at most once.
        let _ = self.entries.insert(at, DelayEntry { task, wake_tick });
    }

    pub fn remove(&mut self, task: TaskId) -> bool {
        match self.entries.iter().position(|e| e.task == task) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    /// Pop the earliest entry if its wake tick has been reached
    pub fn pop_expired(&mut self, now: Tick) -> Option<TaskId> {
        match self.entries.first() {
            Some(e) if e.wake_tick <= now => Some(self.entries.remove(0).task),
            _ => None,
        }
    }

    pub fn next_wake(&self) -> Option<Tick> {
        self.entries.first().map(|e| e.wake_tick)
    }

    pub fn wake_tick(&self, task: TaskId) -> Option<Tick> {
        self.entries.iter().find(|e| e.task == task).map(|e| e.wake_tick)
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.entries.iter().any(|e| e.task == task)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DelayList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u8) -> TaskId {
        TaskId { index, generation: 1 }
    }

    #[test]
    fn test_sorted_by_wake_tick() {
        let mut list = DelayList::new();
        list.insert(id(1), 30);
        list.insert(id(2), 10);
        list.insert(id(3), 20);
        assert_eq!(list.next_wake(), Some(10));
        assert_eq!(list.pop_expired(100), Some(id(2)));
        assert_eq!(list.pop_expired(100), Some(id(3)));
        assert_eq!(list.pop_expired(100), Some(id(1)));
        assert!(list.is_empty());
    }

    #[test]
    fn test_equal_ticks_fifo() {
        let mut list = DelayList::new();
        list.insert(id(1), 5);
        list.insert(id(2), 5);
        list.insert(id(3), 5);
        assert_eq!(list.pop_expired(5), Some(id(1)));
        assert_eq!(list.pop_expired(5), Some(id(2)));
        assert_eq!(list.pop_expired(5), Some(id(3)));
    }

    #[test]
    fn test_not_expired_early() {
        let mut list = DelayList::new();
        list.insert(id(1), 100);
        assert_eq!(list.pop_expired(99), None);
        assert_eq!(list.pop_expired(100), Some(id(1)));
    }

    #[test]
    fn test_remove_once() {
        let mut list = DelayList::new();
        list.insert(id(1), 10);
        assert!(list.contains(id(1)));
        assert_eq!(list.wake_tick(id(1)), Some(10));
        assert!(list.remove(id(1)));
        assert!(!list.remove(id(1)));
        assert_eq!(list.pop_expired(10), None);
    }
}
