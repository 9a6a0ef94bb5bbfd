//! # Physical frame allocator
//!
//! Two stages:
//!
//! 1. Before [`FrameAllocator::bootstrap`], frames are *stolen* from the front
//!    of the boot RAM range by a bump allocator. Stolen frames are never
//!    reclaimed.
//! 2. Afterwards the [`Coremap`] owns what is left and serves first-fit
//!    contiguous runs.
//!
//! ## Coremap markers
//!
//! One `u32` per frame. `0` is free; an `n`-frame run is marked `1, 2, .., n`
//! starting at its first frame.
//!
//! ```text
//! index:   0   1   2   3   4   5
//! marker:  1   0   1   2   3   1
//!          └1┘     └─ 3 run ─┘ └1┘
//! ```
//!
//! A run's length is not stored anywhere; [`Coremap::free`] recovers it by
//! clearing forward from the first frame until it meets a `0` or a `1`.

use kernel_info::boot::RamRange;
use kernel_info::memory::{kvaddr_to_paddr, paddr_to_kvaddr};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use kernel_sync::SpinLock;
use kernel_vmem::{FrameAlloc, FrameFreeError};
use log::{trace, warn};

/// Frame table over a contiguous range of physical frames.
pub struct Coremap<'m> {
    entries: &'m mut [u32],
    base: PhysicalAddress,
}

impl<'m> Coremap<'m> {
    /// Manage `entries.len()` frames starting at `base`. All start out free.
    pub fn new(entries: &'m mut [u32], base: PhysicalAddress) -> Self {
        debug_assert!(base.is_page_aligned());
        entries.fill(0);
        Self { entries, base }
    }

    /// Number of managed frames.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Physical address of the first managed frame.
    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.base
    }

    /// Marker of frame `index`; `None` past the end.
    #[must_use]
    pub fn marker(&self, index: usize) -> Option<u32> {
        self.entries.get(index).copied()
    }

    #[must_use]
    pub fn free_count(&self) -> usize {
        self.entries.iter().filter(|&&e| e == 0).count()
    }

    /// Physical address of frame `index`.
    ///
    /// Saturates to [`PhysicalAddress::INVALID`] if the index cannot be
    /// expressed as a 32-bit address.
    #[must_use]
    pub fn address_of(&self, index: usize) -> PhysicalAddress {
        u32::try_from(index)
            .ok()
            .and_then(|i| i.checked_mul(PAGE_SIZE))
            .and_then(|offset| self.base.checked_add(offset))
            .unwrap_or(PhysicalAddress::INVALID)
    }

    /// Frame index of `pa`, which must be a managed frame base.
    ///
    /// # Errors
    /// [`FrameFreeError::Unaligned`] or [`FrameFreeError::Unmanaged`].
    pub fn index_of(&self, pa: PhysicalAddress) -> Result<usize, FrameFreeError> {
        if !pa.is_page_aligned() {
            return Err(FrameFreeError::Unaligned(pa));
        }
        pa.checked_offset_from(self.base)
            .map(|offset| (offset / PAGE_SIZE) as usize)
            .filter(|&index| index < self.entries.len())
            .ok_or(FrameFreeError::Unmanaged(pa))
    }

    /// First-fit: the lowest run of `n` free frames, marked `1..=n`.
    ///
    /// Returns the index of the run's first frame.
    pub fn allocate(&mut self, n: usize) -> Option<usize> {
        if n == 0 || n > self.entries.len() {
            return None;
        }

        let mut run = 0;
        let mut start = None;
        for (index, &entry) in self.entries.iter().enumerate() {
            if entry != 0 {
                run = 0;
                continue;
            }
            run += 1;
            if run == n {
                start = Some(index + 1 - n);
                break;
            }
        }

        let start = start?;
        for (entry, marker) in self.entries[start..start + n].iter_mut().zip(1u32..) {
            *entry = marker;
        }
        Some(start)
    }

    /// Release the run starting at frame `index` and return its length.
    ///
    /// # Errors
    /// `index` must hold a `1` marker. Anything else is rejected and the table
    /// is left unchanged.
    pub fn free(&mut self, index: usize) -> Result<usize, FrameFreeError> {
        match self.entries.get(index) {
            None => return Err(FrameFreeError::Unmanaged(self.address_of(index))),
            Some(0) => return Err(FrameFreeError::NotAllocated(self.address_of(index))),
            Some(1) => {}
            Some(_) => return Err(FrameFreeError::NotRunStart(self.address_of(index))),
        }

        self.entries[index] = 0;
        let mut len = 1;
        for entry in self.entries[index + 1..].iter_mut().take_while(|e| **e > 1) {
            *entry = 0;
            len += 1;
        }
        Ok(len)
    }
}

/// Bump allocator over the boot RAM range. Never frees.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct StealAllocator {
    next: PhysicalAddress,
    end: PhysicalAddress,
}

impl StealAllocator {
    /// Steal from the [usable](RamRange::usable) part of `ram`.
    #[must_use]
    pub const fn new(ram: RamRange) -> Self {
        let ram = ram.usable();
        Self {
            next: ram.start,
            end: ram.end,
        }
    }

    /// Take the next `n` frames.
    pub fn steal(&mut self, n: usize) -> Option<PhysicalAddress> {
        let bytes = u32::try_from(n).ok()?.checked_mul(PAGE_SIZE)?;
        let pa = self.next;
        let next = pa.checked_add(bytes)?;
        if n == 0 || next > self.end {
            return None;
        }
        self.next = next;
        Some(pa)
    }

    /// What has not been stolen yet.
    #[must_use]
    pub const fn remaining(&self) -> RamRange {
        RamRange {
            start: self.next,
            end: self.end,
        }
    }
}

pub(crate) enum Backend<'m> {
    Steal(StealAllocator),
    Coremap(Coremap<'m>),
}

/// Frame counts reported by [`FrameAllocator::stats`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameStats {
    /// Frames the allocator can hand out in its current stage.
    pub total: usize,
    /// Frames not currently handed out.
    pub free: usize,
}

/// The kernel's physical frame allocator.
///
/// Constructed once at boot from the probed RAM range and shared by reference.
/// A single [`SpinLock`] covers every scan-and-mark and scan-and-clear.
pub struct FrameAllocator<'m> {
    pub(crate) ram: RamRange,
    pub(crate) state: SpinLock<Backend<'m>>,
}

impl<'m> FrameAllocator<'m> {
    /// An allocator in stealing mode over the [usable](RamRange::usable) part
    /// of `ram`.
    #[must_use]
    pub const fn new(ram: RamRange) -> Self {
        let ram = ram.usable();
        Self {
            ram,
            state: SpinLock::new(Backend::Steal(StealAllocator::new(ram))),
        }
    }

    /// The RAM range reported at boot, as far as it is usable.
    #[must_use]
    pub const fn ram(&self) -> RamRange {
        self.ram
    }

    /// Whether the coremap has taken over.
    #[must_use]
    pub fn is_bootstrapped(&self) -> bool {
        self.state
            .with_lock(|backend| matches!(backend, Backend::Coremap(_)))
    }

    #[must_use]
    pub fn stats(&self) -> FrameStats {
        self.state.with_lock(|backend| match backend {
            Backend::Steal(steal) => {
                let free = steal.remaining().pages() as usize;
                FrameStats {
                    total: self.ram.pages() as usize,
                    free,
                }
            }
            Backend::Coremap(map) => FrameStats {
                total: map.len(),
                free: map.free_count(),
            },
        })
    }

    /// Run `f` on the coremap; `None` before bootstrap.
    pub fn with_coremap<R>(&self, f: impl FnOnce(&Coremap<'m>) -> R) -> Option<R> {
        self.state.with_lock(|backend| match backend {
            Backend::Coremap(map) => Some(f(map)),
            Backend::Steal(_) => None,
        })
    }

    /// Allocate `n` contiguous frames and return their KSEG0 address.
    pub fn alloc_kpages(&self, n: usize) -> Option<VirtualAddress> {
        let pa = self.alloc_frames(n)?;
        let kva = paddr_to_kvaddr(pa);
        if kva.is_none() {
            warn!("vm: {pa} is not reachable through KSEG0");
            let _ = self.free_frames(pa);
        }
        kva
    }

    /// Release pages obtained from [`alloc_kpages`](Self::alloc_kpages).
    ///
    /// # Errors
    /// As [`FrameAlloc::free_frames`], or [`FrameFreeError::NotDirectMapped`]
    /// if `kva` is not a KSEG0 address.
    pub fn free_kpages(&self, kva: VirtualAddress) -> Result<(), FrameFreeError> {
        let pa = kvaddr_to_paddr(kva).ok_or(FrameFreeError::NotDirectMapped(kva))?;
        self.free_frames(pa)
    }
}

impl FrameAlloc for FrameAllocator<'_> {
    fn alloc_frames(&self, n: usize) -> Option<PhysicalAddress> {
        let frame = self.state.with_lock(|backend| match backend {
            Backend::Steal(steal) => steal.steal(n),
            Backend::Coremap(map) => map.allocate(n).map(|index| map.address_of(index)),
        });
        if n == 1 {
            trace!("vm: frame {frame:?}");
        }
        frame
    }

    fn free_frames(&self, base: PhysicalAddress) -> Result<(), FrameFreeError> {
        let result = self.state.with_lock(|backend| match backend {
            // stolen memory is never reclaimed
            Backend::Steal(_) => Err(FrameFreeError::Unmanaged(base)),
            Backend::Coremap(map) => map.index_of(base).and_then(|index| map.free(index)),
        });
        match result {
            Ok(len) => {
                trace!("vm: freed {len} frame(s) at {base}");
                Ok(())
            }
            Err(e) => {
                warn!("vm: rejected free: {e}");
                Err(e)
            }
        }
    }
}
