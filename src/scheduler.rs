//! Fixed-priority preemptive scheduler
//!
//! Invariant: the Running slot holds the most eligible Ready task, or the idle
//! task when nothing else is Ready. Every live task is in exactly one of the
//! Running slot, the ready set, the delay list, an object wait list without
//! timeout, or Suspended.
//!
//! Equal priorities are served in arrival order. A task that yields, is
//! preempted, or is time-sliced goes to the tail of its level.

use heapless::Vec;
use log::{debug, trace};

use crate::config::{KernelConfig, MAX_TASKS, WAIT_FOREVER};
use crate::delay::DelayList;
use crate::error::Error;
use crate::heap::Region;
use crate::ready::ReadySet;
use crate::task::{Completion, Task, TaskId, TaskPriority, TaskState, Wait};
use crate::timer::{SysTimer, Tick};

/// Tasks whose object wait timed out during a tick
pub(crate) type Expired = Vec<(TaskId, Wait), MAX_TASKS>;

/// Scheduler statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    /// Ticks since start
    pub ticks: u64,
    /// Changes of the Running slot
    pub context_switches: u64,
    /// Ticks that arrived while idle was running
    pub idle_ticks: u64,
}

/// Scheduler core
///
/// Static task table, no dynamic allocation.
pub struct Scheduler {
    /// Static task table; slot 0 is the idle task
    tasks: [Task; MAX_TASKS],
    ready: ReadySet,
    delayed: DelayList,
    /// Running slot
    current: TaskId,
    idle: TaskId,
    timer: SysTimer,
    preemption: bool,
    time_slicing: bool,
    started: bool,
    /// A wake-up from interrupt context wants a switch at the next scheduling point
    yield_pending: bool,
    pub stats: SchedulerStats,
}

impl Scheduler {
    /// Create a scheduler whose Running slot holds `idle`
    pub fn new(config: &KernelConfig, idle: Task) -> Self {
        let mut tasks: [Task; MAX_TASKS] = core::array::from_fn(|_| Task::empty());
        tasks[0] = idle;
        tasks[0].generation = 1;
        tasks[0].base_priority = TaskPriority::IDLE;
        tasks[0].priority = TaskPriority::IDLE;
        tasks[0].state = TaskState::Running;
        let idle_id = tasks[0].id(0);

        Self {
            tasks,
            ready: ReadySet::new(),
            delayed: DelayList::new(),
            current: idle_id,
            idle: idle_id,
            timer: SysTimer::new(config.tick_rate_hz),
            preemption: config.preemption,
            time_slicing: config.time_slicing,
            started: false,
            yield_pending: false,
            stats: SchedulerStats::default(),
        }
    }

    /// Register a task in the Ready state
    pub fn create(&mut self, mut task: Task) -> Result<TaskId, Error> {
        let index = self
            .tasks
            .iter()
            .position(|t| !t.is_active())
            .ok_or(Error::AllocationFailed)?;
        task.generation = self.tasks[index].generation.wrapping_add(1);
        task.state = TaskState::Ready;
        let priority = task.priority;
        self.tasks[index] = task;
        let id = self.tasks[index].id(index);
        self.ready.push_back(id, priority);
        debug!("task {} created at priority {}", index, priority.0);

        if self.started && self.preemption && priority > self.current_priority() {
            self.switch_out();
        }
        Ok(id)
    }

    /// Hand the Running slot to the most eligible Ready task
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        self.switch_out();
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Task holding the Running slot
    pub fn current(&self) -> TaskId {
        self.current
    }

    pub fn idle(&self) -> TaskId {
        self.idle
    }

    pub fn is_idle_running(&self) -> bool {
        self.current == self.idle
    }

    /// Can the running task enter the Blocked state?
    pub(crate) fn can_block(&self) -> bool {
        self.started && self.current != self.idle
    }

    pub fn now(&self) -> Tick {
        self.timer.now()
    }

    pub fn timer(&self) -> &SysTimer {
        &self.timer
    }

    pub fn ready(&self) -> &ReadySet {
        &self.ready
    }

    pub fn delayed(&self) -> &DelayList {
        &self.delayed
    }

    /// Look up a live task
    pub fn task(&self, id: TaskId) -> Result<&Task, Error> {
        let task = self.tasks.get(id.index()).ok_or(Error::InvalidTask)?;
        if task.generation != id.generation || !task.is_active() {
            return Err(Error::InvalidTask);
        }
        Ok(task)
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, Error> {
        self.task(id)?;
        Ok(&mut self.tasks[id.index()])
    }

    /// Live tasks, idle included
    pub fn tasks(&self) -> impl Iterator<Item = (TaskId, &Task)> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_active())
            .map(|(i, t)| (t.id(i), t))
    }

    /// Live tasks, idle excluded
    pub fn task_count(&self) -> usize {
        self.tasks().count() - 1
    }

    pub(crate) fn current_task_mut(&mut self) -> &mut Task {
        &mut self.tasks[self.current.index()]
    }

    fn current_priority(&self) -> TaskPriority {
        self.tasks[self.current.index()].priority
    }

    /// Pop the next Running task from the ready set
    fn dispatch(&mut self) {
        let Some(next) = self.ready.pop_highest() else {
            return;
        };
        let prev = self.current;
        self.current = next;
        self.tasks[next.index()].state = TaskState::Running;
        if prev != next {
            self.stats.context_switches += 1;
            trace!("switch {} -> {}", prev.index(), next.index());
        }
    }

    /// Re-queue the running task at the tail of its level and dispatch
    fn switch_out(&mut self) {
        let cur = self.current;
        let priority = self.current_priority();
        self.tasks[cur.index()].state = TaskState::Ready;
        self.ready.push_back(cur, priority);
        self.dispatch();
    }

    /// Voluntarily give up the Running slot
    pub fn yield_now(&mut self) {
        if self.started {
            self.switch_out();
        }
    }

    /// Block the running task for `ticks`
    ///
    /// `delay(0)` still yields once so equal-priority siblings get a turn.
    pub fn delay(&mut self, ticks: u32) {
        if ticks == 0 || !self.can_block() {
            self.yield_now();
            return;
        }
        self.block_current(Wait::Delay, ticks);
    }

    /// Move the running task to Blocked; `timeout == WAIT_FOREVER` skips the delay list
    pub(crate) fn block_current(&mut self, wait: Wait, timeout: u32) {
        let cur = self.current;
        let now = self.timer.now();
        let task = &mut self.tasks[cur.index()];
        task.state = TaskState::Blocked;
        task.wait = wait;
        task.outcome = None;
        if timeout != WAIT_FOREVER {
            self.delayed.insert(cur, now + timeout as Tick);
        }
        trace!("task {} blocked on {:?}", cur.index(), wait);
        self.dispatch();
    }

    /// Wake a Blocked task with `outcome`
    ///
    /// Returns true if it outranks the running task.
    pub(crate) fn unblock(&mut self, id: TaskId, outcome: Result<Completion, Error>) -> bool {
        self.delayed.remove(id);
        let task = &mut self.tasks[id.index()];
        task.wait = Wait::None;
        task.outcome = Some(outcome);
        task.state = TaskState::Ready;
        let priority = task.priority;
        self.ready.push_back(id, priority);
        trace!("task {} woken", id.index());
        priority > self.current_priority()
    }

    /// Act on a wake-up that outranks the running task
    ///
    /// From task context the switch happens now; from an interrupt it is
    /// deferred to the next scheduling point.
    pub(crate) fn request_switch(&mut self, higher: bool, from_isr: bool) {
        if !higher || !self.started {
            return;
        }
        if from_isr {
            self.yield_pending = true;
        } else if self.preemption {
            self.switch_out();
        }
    }

    /// Perform a switch deferred by an interrupt
    pub fn apply_pending(&mut self) -> bool {
        if !self.yield_pending {
            return false;
        }
        self.yield_pending = false;
        match self.ready.highest_priority() {
            Some(p) if self.preemption && p > self.current_priority() => {
                self.switch_out();
                true
            }
            _ => false,
        }
    }

    pub fn is_yield_pending(&self) -> bool {
        self.yield_pending
    }

    /// Advance time one tick and wake every task whose wake tick elapsed
    ///
    /// Returns the tasks whose object wait timed out, so the owner can drop
    /// them from those objects' wait lists.
    pub(crate) fn advance_tick(&mut self) -> Expired {
        let now = self.timer.advance();
        self.stats.ticks += 1;
        if self.current == self.idle {
            self.stats.idle_ticks += 1;
        }

        let mut expired = Expired::new();
        while let Some(id) = self.delayed.pop_expired(now) {
            let task = &mut self.tasks[id.index()];
            let wait = task.wait;
            task.outcome = Some(match wait {
                Wait::Delay => Ok(Completion::Delayed),
                _ => Err(Error::Timeout),
            });
            task.wait = Wait::None;
            task.state = TaskState::Ready;
            self.ready.push_back(id, task.priority);
            if wait != Wait::Delay {
                let _ = expired.push((id, wait));
            }
        }
        expired
    }

    /// Tick preemption check
    ///
    /// A strictly more eligible task always preempts; an equal one does so
    /// only with time slicing.
    pub(crate) fn tick_switch(&mut self) -> bool {
        self.yield_pending = false;
        if !self.preemption {
            return false;
        }
        let current = self.current_priority();
        let switch = match self.ready.highest_priority() {
            Some(p) if p > current => true,
            Some(p) => p == current && self.time_slicing,
            None => false,
        };
        if switch {
            self.switch_out();
        }
        switch
    }

    /// Change a task's effective priority, keeping every list consistent
    ///
    /// Returns what the task waits on so object wait lists can be re-sorted.
    pub(crate) fn change_priority(&mut self, id: TaskId, priority: TaskPriority) -> Wait {
        let state = self.tasks[id.index()].state;
        let wait = self.retune(id, priority);
        match state {
            TaskState::Ready => self.reschedule(false),
            TaskState::Running => self.reschedule(true),
            _ => {}
        }
        wait
    }

    /// Change a task's effective priority without making a scheduling decision
    ///
    /// For callers that change several tasks at once and then call
    /// [`Scheduler::reschedule`] a single time.
    pub(crate) fn retune(&mut self, id: TaskId, priority: TaskPriority) -> Wait {
        let task = &mut self.tasks[id.index()];
        let old = task.priority;
        let state = task.state;
        let wait = task.wait;
        if old == priority {
            return wait;
        }
        task.priority = priority;
        debug!("task {} priority {} -> {}", id.index(), old.0, priority.0);

        if state == TaskState::Ready {
            self.ready.remove(id, old);
            self.ready.push_back(id, priority);
        }
        wait
    }

    /// Give the Running slot up if a Ready task outranks the running one
    ///
    /// `voluntary` is set when the running task lowered itself; it yields even
    /// with preemption off.
    pub(crate) fn reschedule(&mut self, voluntary: bool) {
        if !self.started || !(voluntary || self.preemption) {
            return;
        }
        if let Some(p) = self.ready.highest_priority() {
            if p > self.current_priority() {
                self.switch_out();
            }
        }
    }

    /// Remove a task from every list and mark it Terminated
    ///
    /// Returns its wait (for object cleanup) and its stack region.
    pub(crate) fn delete(&mut self, id: TaskId) -> Result<(Wait, Region), Error> {
        if id == self.idle {
            return Err(Error::InvalidTask);
        }
        let task = self.task_mut(id)?;
        let state = task.state;
        let priority = task.priority;
        let wait = task.wait;
        let stack = task.stack;
        *task = Task {
            generation: task.generation,
            ..Task::empty()
        };

        match state {
            TaskState::Ready => {
                self.ready.remove(id, priority);
            }
            TaskState::Blocked => {
                self.delayed.remove(id);
            }
            _ => {}
        }
        debug!("task {} deleted", id.index());
        if state == TaskState::Running {
            self.dispatch();
        }
        Ok((wait, stack))
    }

    /// Take a task out of scheduling; a pending wait is cancelled as `Timeout`
    pub(crate) fn suspend(&mut self, id: TaskId) -> Result<Wait, Error> {
        if id == self.idle {
            return Err(Error::InvalidTask);
        }
        let task = self.task_mut(id)?;
        let state = task.state;
        let priority = task.priority;
        let wait = task.wait;
        match state {
            TaskState::Suspended => return Ok(Wait::None),
            TaskState::Blocked => task.outcome = Some(Err(Error::Timeout)),
            _ => {}
        }
        task.state = TaskState::Suspended;
        task.wait = Wait::None;

        match state {
            TaskState::Ready => {
                self.ready.remove(id, priority);
            }
            TaskState::Blocked => {
                self.delayed.remove(id);
            }
            TaskState::Running => self.dispatch(),
            _ => {}
        }
        Ok(wait)
    }

    /// Return a suspended task to Ready
    pub(crate) fn resume(&mut self, id: TaskId) -> Result<(), Error> {
        let task = self.task_mut(id)?;
        if task.state != TaskState::Suspended {
            return Ok(());
        }
        task.state = TaskState::Ready;
        let priority = task.priority;
        self.ready.push_back(id, priority);
        if self.started && self.preemption && priority > self.current_priority() {
            self.switch_out();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_task(_: &mut crate::kernel::Kernel, _: &mut [u8]) {}

    fn scheduler() -> Scheduler {
        Scheduler::new(
            &KernelConfig::default(),
            Task::new(b"idle", dummy_task, TaskPriority::IDLE),
        )
    }

    fn spawn(sched: &mut Scheduler, priority: u8) -> TaskId {
        sched
            .create(Task::new(b"t", dummy_task, TaskPriority(priority)))
            .unwrap()
    }

    #[test]
    fn test_scheduler_empty() {
        let mut sched = scheduler();
        assert_eq!(sched.task_count(), 0);
        sched.start();
        assert!(sched.is_idle_running());
    }

    #[test]
    fn test_highest_priority_runs() {
        let mut sched = scheduler();
        let low = spawn(&mut sched, 1);
        let high = spawn(&mut sched, 3);
        assert!(sched.is_idle_running());
        sched.start();
        assert_eq!(sched.current(), high);
        assert_eq!(sched.task(low).unwrap().state, TaskState::Ready);
        assert_eq!(sched.task(high).unwrap().state, TaskState::Running);
    }

    #[test]
    fn test_yield_round_robin() {
        let mut sched = scheduler();
        let a = spawn(&mut sched, 2);
        let b = spawn(&mut sched, 2);
        let c = spawn(&mut sched, 2);
        sched.start();
        assert_eq!(sched.current(), a);
        sched.yield_now();
        assert_eq!(sched.current(), b);
        sched.yield_now();
        assert_eq!(sched.current(), c);
        sched.yield_now();
        assert_eq!(sched.current(), a);
    }

    #[test]
    fn test_delay_and_wake() {
        let mut sched = scheduler();
        let a = spawn(&mut sched, 2);
        let b = spawn(&mut sched, 1);
        sched.start();
        assert_eq!(sched.current(), a);

        sched.delay(100);
        assert_eq!(sched.current(), b);
        assert_eq!(sched.task(a).unwrap().state, TaskState::Blocked);

        for _ in 0..99 {
            sched.advance_tick();
            sched.tick_switch();
            assert_eq!(sched.current(), b);
        }
        sched.advance_tick();
        sched.tick_switch();
        assert_eq!(sched.current(), a);
        assert_eq!(sched.task(a).unwrap().outcome, Some(Ok(Completion::Delayed)));
    }

    #[test]
    fn test_delay_zero_yields() {
        let mut sched = scheduler();
        let a = spawn(&mut sched, 2);
        let b = spawn(&mut sched, 2);
        sched.start();
        sched.delay(0);
        assert_eq!(sched.current(), b);
        assert_eq!(sched.task(a).unwrap().state, TaskState::Ready);
    }

    #[test]
    fn test_time_slicing() {
        let mut sched = scheduler();
        let a = spawn(&mut sched, 2);
        let b = spawn(&mut sched, 2);
        sched.start();
        sched.advance_tick();
        assert!(sched.tick_switch());
        assert_eq!(sched.current(), b);
        sched.advance_tick();
        sched.tick_switch();
        assert_eq!(sched.current(), a);
    }

    #[test]
    fn test_no_time_slicing() {
        let config = KernelConfig::default().with_time_slicing(false);
        let mut sched = Scheduler::new(&config, Task::new(b"idle", dummy_task, TaskPriority::IDLE));
        let a = spawn(&mut sched, 2);
        spawn(&mut sched, 2);
        sched.start();
        sched.advance_tick();
        assert!(!sched.tick_switch());
        assert_eq!(sched.current(), a);
    }

    #[test]
    fn test_lower_running_priority_yields() {
        let mut sched = scheduler();
        let a = spawn(&mut sched, 3);
        let b = spawn(&mut sched, 2);
        sched.start();
        sched.change_priority(a, TaskPriority(1));
        assert_eq!(sched.current(), b);
        assert_eq!(sched.task(a).unwrap().state, TaskState::Ready);
    }

    #[test]
    fn test_raise_ready_priority_preempts() {
        let mut sched = scheduler();
        let a = spawn(&mut sched, 2);
        let b = spawn(&mut sched, 1);
        sched.start();
        assert_eq!(sched.current(), a);
        sched.change_priority(b, TaskPriority(4));
        assert_eq!(sched.current(), b);
    }

    #[test]
    fn test_delete_running() {
        let mut sched = scheduler();
        let a = spawn(&mut sched, 2);
        let b = spawn(&mut sched, 1);
        sched.start();
        sched.delete(a).unwrap();
        assert_eq!(sched.current(), b);
        assert_eq!(sched.task(a).err(), Some(Error::InvalidTask));
        assert_eq!(sched.delete(a).err(), Some(Error::InvalidTask));
        assert!(!sched.ready().contains(a));
    }

    #[test]
    fn test_delete_delayed() {
        let mut sched = scheduler();
        let a = spawn(&mut sched, 2);
        sched.start();
        sched.delay(10);
        assert!(sched.delayed().contains(a));
        sched.delete(a).unwrap();
        assert!(sched.delayed().is_empty());
        assert!(sched.is_idle_running());
    }

    #[test]
    fn test_idle_cannot_be_deleted() {
        let mut sched = scheduler();
        let idle = sched.idle();
        assert_eq!(sched.delete(idle).err(), Some(Error::InvalidTask));
    }

    #[test]
    fn test_slot_reuse_rejects_stale_id() {
        let mut sched = scheduler();
        let a = spawn(&mut sched, 2);
        sched.delete(a).unwrap();
        let b = spawn(&mut sched, 2);
        assert_eq!(a.index(), b.index());
        assert!(sched.task(a).is_err());
        assert!(sched.task(b).is_ok());
    }

    #[test]
    fn test_suspend_resume() {
        let mut sched = scheduler();
        let a = spawn(&mut sched, 2);
        sched.start();
        sched.suspend(a).unwrap();
        assert!(sched.is_idle_running());
        assert_eq!(sched.task(a).unwrap().state, TaskState::Suspended);

        sched.advance_tick();
        sched.tick_switch();
        assert!(sched.is_idle_running());

        sched.resume(a).unwrap();
        assert_eq!(sched.current(), a);
    }

    #[test]
    fn test_table_full() {
        let mut sched = scheduler();
        for _ in 1..MAX_TASKS {
            spawn(&mut sched, 1);
        }
        let err = sched.create(Task::new(b"x", dummy_task, TaskPriority::LOW));
        assert_eq!(err, Err(Error::AllocationFailed));
    }

    #[test]
    fn test_idle_ticks_counted() {
        let mut sched = scheduler();
        sched.start();
        sched.advance_tick();
        sched.advance_tick();
        assert_eq!(sched.stats.ticks, 2);
        assert_eq!(sched.stats.idle_ticks, 2);
    }
}
