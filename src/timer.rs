//! System timer — the kernel's tick time base
//!
//! The tick interrupt calls into the kernel once per period; this counter is
//! what wake ticks and timeouts are measured against. On real hardware the
//! period comes from SysTick (Cortex-M) or MTIME (RISC-V).

/// Tick count since the scheduler started
pub type Tick = u64;

/// System timer
pub struct SysTimer {
    /// Ticks elapsed
    ticks: Tick,
    /// Tick interrupt frequency
    tick_rate_hz: u32,
}

impl SysTimer {
    /// Create a timer ticking at `tick_rate_hz`
    pub const fn new(tick_rate_hz: u32) -> Self {
        Self {
            ticks: 0,
            tick_rate_hz: if tick_rate_hz == 0 { 1 } else { tick_rate_hz },
        }
    }

    /// Advance by one tick period
    pub fn advance(&mut self) -> Tick {
        self.ticks += 1;
        self.ticks
    }

    /// Current tick count
    pub fn now(&self) -> Tick {
        self.ticks
    }

    /// Current time in milliseconds
    pub fn now_ms(&self) -> u64 {
        self.ticks * 1000 / self.tick_rate_hz as u64
    }

    /// Tick interrupt frequency
    pub fn tick_rate_hz(&self) -> u32 {
        self.tick_rate_hz
    }

    /// Milliseconds to ticks, rounded down
    pub fn ms_to_ticks(&self, ms: u32) -> u32 {
        (ms as u64 * self.tick_rate_hz as u64 / 1000).min(u32::MAX as u64 - 1) as u32
    }

    /// Ticks elapsed since a reference tick
    pub fn elapsed_since(&self, reference: Tick) -> Tick {
        self.ticks.saturating_sub(reference)
    }
}
