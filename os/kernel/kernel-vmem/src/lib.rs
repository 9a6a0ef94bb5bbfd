//! # Virtual Memory Support
//!
//! Software-managed MMU path for a teaching kernel: per-process address spaces,
//! a page fault handler that refills the hardware translation cache, and the
//! small interfaces those need from the rest of the kernel.
//!
//! ## What you get
//! - An [`AddressSpace`] with up to two variable-length segments and one fixed
//!   stack region, each owning one physical frame per virtual page.
//! - A model of the hardware translation cache ([`Tlb`], [`TlbHi`], [`TlbLo`])
//!   and a software implementation ([`SoftTlb`]) for hosted runs.
//! - An [`Mmu`] per execution unit that brackets every cache update with the
//!   interrupt level raised, and resolves faults via [`Mmu::vm_fault`].
//! - A tiny allocator/mapper interface ([`FrameAlloc`], [`PhysMapper`]).
//!
//! ## Translation path
//!
//! ```text
//!   user load/store
//!        │
//!        ▼
//!   ┌──────────┐   hit    ┌─────────────┐
//!   │   TLB    ├─────────►│  physical   │
//!   │ 64 slots │          │    frame    │
//!   └────┬─────┘          └─────────────┘
//!        │ miss / write to clean entry
//!        ▼
//!   trap ──► Mmu::vm_fault ──► AddressSpace window lookup
//!                 │                  (segment 1, segment 2, stack)
//!                 ▼
//!        write one slot (free slot first, else a random victim)
//! ```
//!
//! There is no page table: an address space *is* its frame arrays, and the
//! translation cache is refilled straight from them. Entries are not tagged
//! with an address-space identifier, so switching address spaces flushes the
//! whole cache ([`Mmu::activate`]).

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

pub mod address_space;
mod errno;
pub mod fault;
mod mmu;
mod tlb;

#[cfg(test)]
mod testing;

extern crate alloc;

pub use crate::address_space::{AddressSpace, AddressSpaceError, Region, RegionPermissions};
pub use crate::errno::Errno;
pub use crate::fault::{CurrentProcess, FaultError, FaultKind};
pub use crate::mmu::{Installed, Mmu, ShootdownUnsupported};
pub use crate::tlb::{SoftTlb, Tlb, TlbHi, TlbLo};

/// Re-export constants as info module.
pub use kernel_info::memory as info;
pub use kernel_memory_addresses as addresses;

use kernel_memory_addresses::{PAGE_BYTES, PhysicalAddress, VirtualAddress};

/// Physical frame allocator as seen by the address-space model.
///
/// Implementations guard their own state, hence `&self`. Returned runs are
/// page aligned and physically contiguous. Allocation failure is `None`
/// and is never retried internally.
pub trait FrameAlloc {
    /// Allocate a run of `n` contiguous frames and return the base of the run.
    fn alloc_frames(&self, n: usize) -> Option<PhysicalAddress>;

    /// Release a run previously returned by [`alloc_frames`](Self::alloc_frames).
    ///
    /// # Errors
    /// `base` must be the first frame of a live run; anything else is
    /// rejected without touching the allocator's state.
    fn free_frames(&self, base: PhysicalAddress) -> Result<(), FrameFreeError>;

    /// Allocate a single frame.
    #[inline]
    fn alloc_frame(&self) -> Option<PhysicalAddress> {
        self.alloc_frames(1)
    }
}

/// A rejected [`FrameAlloc::free_frames`] call.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FrameFreeError {
    #[error("{0} is not managed by the frame allocator")]
    Unmanaged(PhysicalAddress),
    #[error("{0} is not page aligned")]
    Unaligned(PhysicalAddress),
    #[error("{0} is inside an allocated run, not at its start")]
    NotRunStart(PhysicalAddress),
    #[error("{0} is not allocated")]
    NotAllocated(PhysicalAddress),
    #[error("{0} is not a direct-mapped kernel address")]
    NotDirectMapped(VirtualAddress),
}

/// Converts physical addresses to usable pointers in the kernel's view of memory
/// (KSEG0 on the real machine, a heap buffer when hosted).
///
/// # Safety
/// Implementations must return pointers that are valid for reads and writes of
/// at least the rest of the frame containing `pa`.
pub trait PhysMapper {
    /// Pointer to the byte at physical address `pa`.
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8;

    /// View `len` consecutive `T`s starting at `pa` as a slice.
    ///
    /// # Safety
    /// - All `len * size_of::<T>()` bytes must be backed by memory the caller may write.
    /// - Lifetime `'a` is not tied to anything; the caller keeps the memory alive.
    /// - Type `T` must match the bytes at `pa` (no aliasing UB).
    #[inline]
    unsafe fn phys_to_slice_mut<'a, T>(&self, pa: PhysicalAddress, len: usize) -> &'a mut [T] {
        unsafe { core::slice::from_raw_parts_mut(self.phys_to_ptr(pa).cast::<T>(), len) }
    }

    /// Fill one frame with zeros.
    ///
    /// # Safety
    /// `frame` must be a page-aligned frame the caller owns.
    #[inline]
    unsafe fn zero_frame(&self, frame: PhysicalAddress) {
        debug_assert!(frame.is_page_aligned());
        unsafe { core::ptr::write_bytes(self.phys_to_ptr(frame), 0, PAGE_BYTES) }
    }

    /// Copy the full contents of frame `src` into frame `dst`.
    ///
    /// # Safety
    /// Both must be page-aligned, distinct frames; the caller owns `dst`.
    #[inline]
    unsafe fn copy_frame(&self, dst: PhysicalAddress, src: PhysicalAddress) {
        debug_assert!(dst.is_page_aligned() && src.is_page_aligned());
        debug_assert_ne!(dst, src);
        unsafe {
            core::ptr::copy_nonoverlapping(self.phys_to_ptr(src), self.phys_to_ptr(dst), PAGE_BYTES);
        }
    }
}
