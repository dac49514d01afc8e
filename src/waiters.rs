//! Per-object waiter list — highest priority first, then earliest blocked

use heapless::Vec;

use crate::config::MAX_TASKS;
use crate::task::{TaskId, TaskPriority};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Waiter {
    task: TaskId,
    priority: TaskPriority,
}

#[derive(Debug, Clone)]
pub struct WaitList {
    entries: Vec<Waiter, MAX_TASKS>,
}

impl WaitList {
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Queue behind every waiter of equal or higher priority
    pub fn insert(&mut self, task: TaskId, priority: TaskPriority) {
        let at = self
            .entries
            .iter()
            .position(|w| w.priority < priority)
            .unwrap_or(self.entries.len());
        let _ = self.entries.insert(at, Waiter { task, priority });
    }

    pub fn pop_highest(&mut self) -> Option<TaskId> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0).task)
        }
    }

    pub fn remove(&mut self, task: TaskId) -> bool {
        match self.entries.iter().position(|w| w.task == task) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    /// Re-sort a waiter whose priority changed while blocked
    pub fn reposition(&mut self, task: TaskId, priority: TaskPriority) {
        if self.remove(task) {
            self.insert(task, priority);
        }
    }

    pub fn highest_priority(&self) -> Option<TaskPriority> {
        self.entries.first().map(|w| w.priority)
    }

    pub fn tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries.iter().map(|w| w.task)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for WaitList {
    fn default() -> Self {
        Self::new()
    }
}
