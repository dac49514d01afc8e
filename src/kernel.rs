//! Kernel — top-level RTOS manager
//!
//! Owns the scheduler, the heap and the object tables, and is the entry point
//! for applications: task management, the tick handler, and the execution
//! loop that runs task bodies one slice at a time.
//!
//! Task-context operations act on behalf of whichever task holds the Running
//! slot when they are called.

use log::{debug, warn};

use crate::config::{IdleHook, KernelConfig, IDLE_STACK_SIZE, MAX_QUEUES, MAX_QUEUE_SETS, MIN_STACK_SIZE, PARAM_BYTES};
use crate::error::Error;
use crate::handle::Arena;
use crate::heap::{Heap, Region};
use crate::queue::Queue;
use crate::queue_set::QueueSet;
use crate::scheduler::Scheduler;
use crate::task::{Completion, Task, TaskFn, TaskId, TaskPriority, TaskState, Wait};
use crate::timer::Tick;

/// Who is calling a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Context {
    Task,
    /// Interrupt handler: never blocks, switches are deferred
    Isr,
}

fn idle_task(_: &mut Kernel, _: &mut [u8]) {}

/// RTOS kernel
pub struct Kernel {
    /// Task scheduler
    pub scheduler: Scheduler,
    pub(crate) heap: Heap,
    pub(crate) queues: Arena<Queue, MAX_QUEUES>,
    pub(crate) sets: Arena<QueueSet, MAX_QUEUE_SETS>,
    idle_hook: Option<IdleHook>,
    /// Execution loop active
    running: bool,
    /// Idle iterations executed
    idle_iterations: u64,
}

impl Kernel {
    /// Create a kernel; only the idle task exists until tasks are added
    pub fn new(config: KernelConfig) -> Self {
        let mut heap = Heap::new();
        let mut idle = Task::new(b"idle", idle_task, TaskPriority::IDLE);
        idle.stack = heap.alloc(IDLE_STACK_SIZE).unwrap_or(Region::EMPTY);

        Self {
            scheduler: Scheduler::new(&config, idle),
            heap,
            queues: Arena::new(),
            sets: Arena::new(),
            idle_hook: config.idle_hook,
            running: false,
            idle_iterations: 0,
        }
    }

    /// Kernel with the default policy (1 kHz, preemptive, time-sliced)
    pub fn testing() -> Self {
        Self::new(KernelConfig::default())
    }

    /// Register a task
    ///
    /// `stack_size` is charged to the kernel heap; `params` is the initial
    /// parameter block handed to `func` on every slice.
    pub fn create_task(
        &mut self,
        name: &[u8],
        func: TaskFn,
        priority: TaskPriority,
        stack_size: usize,
        params: &[u8],
    ) -> Result<TaskId, Error> {
        if stack_size < MIN_STACK_SIZE || params.len() > PARAM_BYTES {
            warn!("task rejected: stack {} params {}", stack_size, params.len());
            return Err(Error::AllocationFailed);
        }
        let stack = self.heap.alloc(stack_size).map_err(|e| {
            warn!("no heap for a {} byte stack", stack_size);
            e
        })?;

        let mut task = Task::new(name, func, priority);
        task.stack = stack;
        let _ = task.params.extend_from_slice(params);
        self.scheduler.create(task).map_err(|e| {
            self.heap.free(stack);
            warn!("task table full");
            e
        })
    }

    /// Start scheduling: the most eligible Ready task takes the Running slot
    pub fn start(&mut self) {
        debug!("scheduler started with {} tasks", self.scheduler.task_count());
        self.scheduler.start();
    }

    /// Task holding the Running slot
    pub fn current(&self) -> TaskId {
        self.scheduler.current()
    }

    /// Current tick count
    pub fn now(&self) -> Tick {
        self.scheduler.now()
    }

    /// Milliseconds to ticks at the configured tick rate
    pub fn ms_to_ticks(&self, ms: u32) -> u32 {
        self.scheduler.timer().ms_to_ticks(ms)
    }

    /// Give the Running slot to the next task of equal priority, if any
    pub fn yield_now(&mut self) {
        self.scheduler.yield_now();
    }

    /// Block the running task for `ticks`; `delay(0)` yields
    pub fn delay(&mut self, ticks: u32) {
        self.scheduler.delay(ticks);
    }

    /// Change a task's assigned priority
    ///
    /// A priority raised by mutex inheritance is not lowered here; the new
    /// base takes effect when the mutex is released. The idle task keeps the
    /// lowest priority and is rejected with `InvalidTask`.
    pub fn set_priority(&mut self, id: TaskId, priority: TaskPriority) -> Result<(), Error> {
        if id == self.scheduler.idle() {
            return Err(Error::InvalidTask);
        }
        let priority = priority.clamped();
        let task = self.scheduler.task_mut(id)?;
        let effective = if task.is_inheriting() && priority < task.priority {
            task.priority
        } else {
            priority
        };
        task.base_priority = priority;
        self.reprioritize(id, effective);
        Ok(())
    }

    /// Effective priority
    pub fn priority(&self, id: TaskId) -> Result<TaskPriority, Error> {
        self.scheduler.task(id).map(|t| t.priority)
    }

    /// Assigned priority, ignoring inheritance
    pub fn base_priority(&self, id: TaskId) -> Result<TaskPriority, Error> {
        self.scheduler.task(id).map(|t| t.base_priority)
    }

    pub fn task_state(&self, id: TaskId) -> Result<TaskState, Error> {
        self.scheduler.task(id).map(|t| t.state)
    }

    /// Slices the task has executed
    pub fn run_count(&self, id: TaskId) -> Result<u32, Error> {
        self.scheduler.task(id).map(|t| t.run_count)
    }

    /// Delete a task; its handle is invalid from now on
    ///
    /// Mutexes it holds stay taken.
    pub fn delete_task(&mut self, id: TaskId) -> Result<(), Error> {
        let (wait, stack) = self.scheduler.delete(id)?;
        self.detach_waiter(id, wait);
        self.heap.free(stack);
        Ok(())
    }

    /// Suspend a task; a blocking call in progress reports `Timeout`
    pub fn suspend(&mut self, id: TaskId) -> Result<(), Error> {
        let wait = self.scheduler.suspend(id)?;
        self.detach_waiter(id, wait);
        Ok(())
    }

    pub fn resume(&mut self, id: TaskId) -> Result<(), Error> {
        self.scheduler.resume(id)
    }

    /// Collect the result of the running task's last blocking call
    ///
    /// A received item is copied into `item`. Returns `None` if there is
    /// nothing to collect.
    pub fn wait_result(&mut self, item: &mut [u8]) -> Option<Result<Completion, Error>> {
        let task = self.scheduler.current_task_mut();
        let outcome = task.outcome.take()?;
        if outcome == Ok(Completion::Received) {
            let n = task.transfer.len().min(item.len());
            item[..n].copy_from_slice(&task.transfer[..n]);
            task.transfer.clear();
        }
        Some(outcome)
    }

    /// Tick handler, called once per timer period and never re-entered
    ///
    /// Wakes expired delays and timeouts, then applies the preemption policy.
    /// Returns true if the Running slot changed hands by preemption.
    pub fn tick(&mut self) -> bool {
        if !self.scheduler.is_started() {
            return false;
        }
        let expired = self.scheduler.advance_tick();
        for (id, wait) in expired {
            self.detach_waiter(id, wait);
        }
        self.scheduler.tick_switch()
    }

    /// Perform a switch requested by an interrupt handler
    pub fn yield_from_isr(&mut self, switch_required: bool) -> bool {
        switch_required && self.scheduler.apply_pending()
    }

    /// Run one slice of the running task, or one idle iteration
    ///
    /// Returns the task that ran.
    pub fn step(&mut self) -> TaskId {
        self.scheduler.apply_pending();
        let id = self.scheduler.current();
        if self.scheduler.is_idle_running() {
            self.idle_iterations += 1;
            if let Some(hook) = self.idle_hook {
                hook();
            }
            return id;
        }

        let task = self.scheduler.current_task_mut();
        task.run_count += 1;
        let Some(func) = task.func else {
            return id;
        };
        let mut params = task.params.clone();
        func(self, &mut params[..]);
        if let Ok(task) = self.scheduler.task_mut(id) {
            task.params = params;
        }
        id
    }

    /// Alternate `step` and `tick` for `ticks` periods (testing)
    pub fn run_for(&mut self, ticks: u64) -> KernelStats {
        self.running = true;
        self.start();
        let mut elapsed = 0u64;

        while elapsed < ticks && self.running {
            self.step();
            self.tick();
            elapsed += 1;
        }

        self.running = false;
        self.stats(elapsed)
    }

    /// Stop the execution loop (callable from a task body)
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Is the execution loop running?
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Unallocated heap bytes
    pub fn heap_free(&self) -> usize {
        self.heap.free_bytes()
    }

    /// Memory footprint estimate
    pub fn memory_footprint(&self) -> usize {
        core::mem::size_of::<Self>()
    }

    fn stats(&self, elapsed: u64) -> KernelStats {
        let s = &self.scheduler.stats;
        KernelStats {
            elapsed_ticks: elapsed,
            total_ticks: s.ticks,
            context_switches: s.context_switches,
            idle_ticks: s.idle_ticks,
            idle_iterations: self.idle_iterations,
            tasks: self.scheduler.task_count(),
            queues: self.queues.len(),
        }
    }

    /// Change a task's effective priority and re-sort any wait list it is in
    pub(crate) fn reprioritize(&mut self, id: TaskId, priority: TaskPriority) {
        let wait = self.scheduler.change_priority(id, priority);
        self.reposition_waiter(id, wait, priority);
    }

    /// `reprioritize` without a scheduling decision; the caller reschedules
    pub(crate) fn retune(&mut self, id: TaskId, priority: TaskPriority) {
        let wait = self.scheduler.retune(id, priority);
        self.reposition_waiter(id, wait, priority);
    }

    fn reposition_waiter(&mut self, id: TaskId, wait: Wait, priority: TaskPriority) {
        match wait {
            Wait::Send { queue, .. } => {
                if let Some(q) = self.queues.get_mut(queue.0) {
                    q.senders.reposition(id, priority);
                }
            }
            Wait::Receive(queue) => {
                if let Some(q) = self.queues.get_mut(queue.0) {
                    q.receivers.reposition(id, priority);
                }
            }
            Wait::Select(set) => {
                if let Some(s) = self.sets.get_mut(set.0) {
                    s.waiters.reposition(id, priority);
                }
            }
            Wait::None | Wait::Delay => {}
        }
    }

    /// Drop a task from the wait list of the object it was blocked on
    pub(crate) fn detach_waiter(&mut self, id: TaskId, wait: Wait) {
        match wait {
            Wait::Send { queue, .. } => {
                if let Some(q) = self.queues.get_mut(queue.0) {
                    q.senders.remove(id);
                }
            }
            Wait::Receive(queue) => {
                let mut mutex = false;
                if let Some(q) = self.queues.get_mut(queue.0) {
                    q.receivers.remove(id);
                    mutex = q.is_mutex();
                }
                if mutex {
                    self.disinherit_after_timeout(queue);
                }
            }
            Wait::Select(set) => {
                if let Some(s) = self.sets.get_mut(set.0) {
                    s.waiters.remove(id);
                }
            }
            Wait::None | Wait::Delay => {}
        }
    }
}

/// Kernel execution statistics
#[derive(Debug, Clone)]
pub struct KernelStats {
    /// Ticks covered by this run
    pub elapsed_ticks: u64,
    /// Ticks since start
    pub total_ticks: u64,
    /// Context switches since start
    pub context_switches: u64,
    /// Ticks that found the idle task running
    pub idle_ticks: u64,
    /// Idle iterations (idle hook calls)
    pub idle_iterations: u64,
    /// Live tasks, idle excluded
    pub tasks: usize,
    /// Live queues, semaphores and mutexes
    pub queues: usize,
}
