use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Interrupt-priority control of one execution unit.
///
/// The surrounding kernel implements this on top of its status register
/// (`splhigh` / `splx`). [`raise`](InterruptLevel::raise) blocks all
/// interrupts and returns the level that was active before, which
/// [`restore`](InterruptLevel::restore) later puts back. Nested brackets
/// therefore compose.
pub trait InterruptLevel {
    /// Opaque saved priority level.
    type Level: Copy;

    /// Raise to the highest priority (interrupts off) and return the previous level.
    fn raise(&self) -> Self::Level;

    /// Restore a level previously returned by [`raise`](Self::raise).
    fn restore(&self, level: Self::Level);

    /// Whether interrupts are currently blocked.
    fn is_raised(&self) -> bool;
}

/// RAII guard that raises the interrupt level on creation and restores it on drop.
///
/// # Examples
///
/// ```
/// use kernel_sync::{InterruptLevel, SoftInterrupts, SplGuard};
///
/// let cpu = SoftInterrupts::new();
/// {
///     let _spl = SplGuard::new(&cpu);
///     assert!(cpu.is_raised());
/// }
/// assert!(!cpu.is_raised());
/// ```
pub struct SplGuard<'a, I: InterruptLevel> {
    irq: &'a I,
    previous: I::Level,
}

impl<'a, I: InterruptLevel> SplGuard<'a, I> {
    #[inline]
    #[must_use]
    pub fn new(irq: &'a I) -> Self {
        let previous = irq.raise();
        Self { irq, previous }
    }
}

impl<I: InterruptLevel> Drop for SplGuard<'_, I> {
    fn drop(&mut self) {
        self.irq.restore(self.previous);
    }
}

/// Software model of one execution unit's interrupt state.
///
/// Used when the core runs hosted (tests, simulators). It tracks the
/// enabled/blocked state and counts how often interrupts were raised.
#[derive(Debug, Default)]
pub struct SoftInterrupts {
    blocked: AtomicBool,
    raises: AtomicUsize,
}

impl SoftInterrupts {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            blocked: AtomicBool::new(false),
            raises: AtomicUsize::new(0),
        }
    }

    /// Number of times [`raise`](InterruptLevel::raise) was called.
    #[must_use]
    pub fn raise_count(&self) -> usize {
        self.raises.load(Ordering::Relaxed)
    }
}

impl InterruptLevel for SoftInterrupts {
    /// `true` if interrupts were already blocked.
    type Level = bool;

    fn raise(&self) -> bool {
        self.raises.fetch_add(1, Ordering::Relaxed);
        self.blocked.swap(true, Ordering::Acquire)
    }

    fn restore(&self, level: bool) {
        self.blocked.store(level, Ordering::Release);
    }

    fn is_raised(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }
}
