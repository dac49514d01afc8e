//! Kernel instance shared between thread mode and interrupt handlers
//!
//! Every access runs inside a critical section, which is what serializes the
//! tick handler, interrupt handlers and task-context calls against each other.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::isr::IsrContext;
use crate::kernel::Kernel;

/// Kernel behind a critical-section mutex, suitable for a `static`
pub struct SharedKernel {
    inner: Mutex<RefCell<Option<Kernel>>>,
}

impl SharedKernel {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Install the kernel, returning the one it replaces
    pub fn init(&self, kernel: Kernel) -> Option<Kernel> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).replace(kernel))
    }

    /// Run `f` on the kernel; `None` before `init`
    pub fn with<R>(&self, f: impl FnOnce(&mut Kernel) -> R) -> Option<R> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).as_mut().map(f))
    }

    /// Timer interrupt entry: advance one tick
    pub fn tick(&self) -> bool {
        self.with(Kernel::tick).unwrap_or(false)
    }

    /// Interrupt entry: run `f` and perform any switch it made necessary
    pub fn isr<R>(&self, f: impl FnOnce(&mut IsrContext<'_>) -> R) -> Option<R> {
        self.with(|kernel| {
            let (result, switch_required) = kernel.isr(f);
            kernel.yield_from_isr(switch_required);
            result
        })
    }

    /// Remove the kernel
    pub fn take(&self) -> Option<Kernel> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).take())
    }
}

impl Default for SharedKernel {
    fn default() -> Self {
        Self::new()
    }
}
