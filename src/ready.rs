//! Ready set — one FIFO per priority level plus a bitmap of non-empty levels
//!
//! Arrival order within a level is kept, which gives round-robin among equal
//! priorities when the running task is re-queued at the tail.

use heapless::Deque;

use crate::config::{MAX_PRIORITIES, MAX_TASKS};
use crate::task::{TaskId, TaskPriority};

pub struct ReadySet {
    levels: [Deque<TaskId, MAX_TASKS>; MAX_PRIORITIES],
    /// Bit `p` set iff level `p` is non-empty
    bitmap: u32,
}

impl ReadySet {
    pub fn new() -> Self {
        Self {
            levels: core::array::from_fn(|_| Deque::new()),
            bitmap: 0,
        }
    }

    /// Append at the tail of the task's priority level
    pub fn push_back(&mut self, id: TaskId, priority: TaskPriority) {
        let level = priority.level();
        // Each live task is queued at most once, so a level never exceeds MAX_TASKS.
        let _ = self.levels[level].push_back(id);
        self.bitmap |= 1 << level;
    }

    /// Remove and return the head of the most eligible non-empty level
    pub fn pop_highest(&mut self) -> Option<TaskId> {
        let level = self.highest_level()?;
        let id = self.levels[level].pop_front();
        if self.levels[level].is_empty() {
            self.bitmap &= !(1 << level);
        }
        id
    }

    /// Priority of the most eligible ready task
    pub fn highest_priority(&self) -> Option<TaskPriority> {
        self.highest_level().map(|l| TaskPriority(l as u8))
    }

    /// Remove `id` from `priority`'s level, keeping the order of the rest
    pub fn remove(&mut self, id: TaskId, priority: TaskPriority) -> bool {
        let level = priority.level();
        let queue = &mut self.levels[level];
        let mut found = false;
        for _ in 0..queue.len() {
            if let Some(t) = queue.pop_front() {
                if t == id && !found {
                    found = true;
                } else {
                    let _ = queue.push_back(t);
                }
            }
        }
        if queue.is_empty() {
            self.bitmap &= !(1 << level);
        }
        found
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.levels.iter().any(|l| l.iter().any(|t| *t == id))
    }

    /// Tasks queued at `priority`, head first
    pub fn level(&self, priority: TaskPriority) -> impl Iterator<Item = &TaskId> {
        self.levels[priority.level()].iter()
    }

    pub fn len(&self) -> usize {
        self.levels.iter().map(|l| l.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap == 0
    }

    fn highest_level(&self) -> Option<usize> {
        if self.bitmap == 0 {
            None
        } else {
            Some(31 - self.bitmap.leading_zeros() as usize)
        }
    }
}

impl Default for ReadySet {
    fn default() -> Self {
        Self::new()
    }
}
