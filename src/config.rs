//! Kernel configuration — compile-time limits and runtime policy
//!
//! Every table in the kernel is statically sized from the constants below.
//! Runtime behaviour (tick rate, preemption policy, idle hook) is chosen per
//! kernel instance through [`KernelConfig`].

/// Maximum tasks the kernel can manage, idle task included
pub const MAX_TASKS: usize = 16;

/// Number of priority levels (0 = idle, `MAX_PRIORITIES - 1` = most eligible)
///
/// Must not exceed 32: the ready set tracks non-empty levels in a `u32` bitmap.
pub const MAX_PRIORITIES: usize = 8;

/// Maximum queues, semaphores and mutexes alive at once
pub const MAX_QUEUES: usize = 16;

/// Maximum queue sets alive at once
pub const MAX_QUEUE_SETS: usize = 4;

/// Maximum pending notifications a single queue set can buffer
pub const MAX_SET_SLOTS: usize = 32;

/// Largest item a queue may carry (bytes)
pub const MAX_ITEM_SIZE: usize = 32;

/// Size of a task's initial parameter block (bytes)
pub const PARAM_BYTES: usize = 16;

/// Kernel heap: task stacks and queue storage are carved from this pool
pub const HEAP_BYTES: usize = 8 * 1024;

/// Maximum simultaneous heap allocations
pub const MAX_HEAP_BLOCKS: usize = MAX_TASKS + MAX_QUEUES;

/// Smallest stack a task may be created with (bytes)
pub const MIN_STACK_SIZE: usize = 64;

/// Stack reserved for the implicit idle task (bytes)
pub const IDLE_STACK_SIZE: usize = 128;

/// Block without timeout
pub const WAIT_FOREVER: u32 = u32::MAX;

/// Default tick rate (1000 Hz = 1 ms tick)
pub const DEFAULT_TICK_RATE_HZ: u32 = 1000;

/// Idle hook: called once per idle iteration, must be short and non-blocking
pub type IdleHook = fn();

/// Runtime kernel policy
#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    /// Tick interrupt frequency
    pub tick_rate_hz: u32,
    /// Allow ticks and wake-ups to switch away from the running task
    pub preemption: bool,
    /// Rotate equal-priority ready tasks on every tick
    pub time_slicing: bool,
    /// Optional idle hook
    pub idle_hook: Option<IdleHook>,
}

impl KernelConfig {
    /// Preemptive, time-sliced, 1 kHz tick, no idle hook
    pub const fn new() -> Self {
        Self {
            tick_rate_hz: DEFAULT_TICK_RATE_HZ,
            preemption: true,
            time_slicing: true,
            idle_hook: None,
        }
    }

    pub const fn with_tick_rate(mut self, tick_rate_hz: u32) -> Self {
        self.tick_rate_hz = tick_rate_hz;
        self
    }

    pub const fn with_preemption(mut self, preemption: bool) -> Self {
        self.preemption = preemption;
        self
    }

    pub const fn with_time_slicing(mut self, time_slicing: bool) -> Self {
        self.time_slicing = time_slicing;
        self
    }

    pub const fn with_idle_hook(mut self, hook: IdleHook) -> Self {
        self.idle_hook = Some(hook);
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}
