//! # Boot-time RAM probe record

use crate::memory::KSEG0_SIZE;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress};

/// Usable physical RAM as reported by the boot-time probe.
///
/// `start` is the first free physical byte after the kernel image, `end` is
/// one past the last byte of RAM. Both are page aligned by [`RamRange::new`].
///
/// Only RAM the kernel can reach through KSEG0 counts, and frame 0 never does:
/// physical address 0 doubles as the "no frame" value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RamRange {
    /// First usable physical address.
    pub start: PhysicalAddress,
    /// One past the last usable physical address.
    pub end: PhysicalAddress,
}

impl RamRange {
    /// Construct a range, rounding `start` up and `end` down to page boundaries.
    ///
    /// An inverted or overflowing range collapses to an empty one. See
    /// [`usable`](Self::usable) for the other adjustments.
    #[must_use]
    pub const fn new(start: PhysicalAddress, end: PhysicalAddress) -> Self {
        Self { start, end }.usable()
    }

    /// This range without frame 0 and cut off at the end of KSEG0, page aligned.
    #[must_use]
    pub const fn usable(self) -> Self {
        let end = if self.end.as_u32() > KSEG0_SIZE {
            PhysicalAddress::new(KSEG0_SIZE)
        } else {
            self.end.page_base()
        };
        let start = if self.start.as_u32() < PAGE_SIZE {
            PhysicalAddress::new(PAGE_SIZE)
        } else {
            self.start
        };
        let start = match start.align_up() {
            Some(s) if s.as_u32() <= end.as_u32() => s,
            _ => end,
        };
        Self { start, end }
    }

    /// Number of whole pages in the range.
    #[must_use]
    pub const fn pages(&self) -> u32 {
        (self.end.as_u32() - self.start.as_u32()) / PAGE_SIZE
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pages() == 0
    }
}
